use crate::{
    common::Endpoint, event::Event, membership::MembershipTable, protocol::MemberRecord,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// A cheap, cloneable view onto a running `Node`.
#[derive(Clone)]
pub struct Handle {
    table: MembershipTable,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Handle {
    pub(crate) fn new(table: MembershipTable, shutdown_tx: Arc<watch::Sender<bool>>) -> Self {
        Handle { table, shutdown_tx }
    }

    pub fn local(&self) -> &Endpoint {
        self.table.local()
    }

    /// Members currently believed alive, ourselves included.
    pub fn members(&self) -> Vec<MemberRecord> {
        self.table.snapshot()
    }

    /// Members declared dead, with the heartbeat they had when they died.
    pub fn dead_members(&self) -> Vec<MemberRecord> {
        self.table.dead_snapshot()
    }

    /// Subscribe to membership changes from now on.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.table.subscribe()
    }

    /// Ask the node to stop. Both loops notice at once, a pending receive is
    /// abandoned.
    pub fn shutdown(&self) {
        // Fails only once the node is gone, in which case it is stopped already.
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("local", self.local())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
