use crate::{
    config::Config,
    error::{Error, Result},
    membership::{MembershipTable, MergeSummary},
    protocol,
    transport::Transport,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

/// The receive half of a node: merge every member list that arrives.
pub(crate) struct Receiver<T> {
    table: MembershipTable,
    transport: Arc<T>,
    max_payload: usize,
    max_consecutive_errors: usize,
}

impl<T: Transport> Receiver<T> {
    pub(crate) fn new(table: MembershipTable, transport: Arc<T>, config: &Config) -> Self {
        Self {
            table,
            transport,
            max_payload: config.max_payload,
            max_consecutive_errors: config.max_consecutive_recv_errors.max(1),
        }
    }

    /// Receive until shut down.
    ///
    /// Malformed datagrams are dropped. A failing receive is retried, but
    /// after `max_consecutive_errors` failures in a row the loop gives up and
    /// returns the last error.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        // One spare byte tells an oversized datagram from one that fits exactly.
        let mut buf = vec![0u8; self.max_payload + 1];
        let mut errors = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                received = self.transport.recv_from(&mut buf) => received,
                _ = shutdown.changed() => break,
            };

            match received {
                Ok((len, from)) => {
                    errors = 0;
                    self.handle(&buf[..len], &from);
                }
                Err(e) => {
                    errors += 1;

                    if errors >= self.max_consecutive_errors {
                        error!(error = %e, errors, "Receive failing repeatedly, giving up");
                        return Err(Error::new_recv(Some(Box::new(e))));
                    }

                    warn!(error = %e, errors, "Receive failed");
                }
            }
        }

        debug!("Receiver stopped");
        Ok(())
    }

    /// Decode one datagram and merge it. Returns `None` if the datagram was
    /// dropped.
    pub(crate) fn handle(&self, datagram: &[u8], from: &str) -> Option<MergeSummary> {
        let members = match protocol::decode(datagram, self.max_payload) {
            Ok(members) => members,
            Err(error) => {
                warn!(%from, %error, bytes = datagram.len(), "Dropping malformed datagram");
                return None;
            }
        };

        trace!(%from, members = members.len(), "Received member list");

        let summary = self.table.merge(&members);
        if summary.changed() {
            debug!(
                %from,
                updated = summary.updated,
                discovered = summary.discovered,
                rejoined = summary.rejoined,
                "Merged member list"
            );
            debug!(members = ?self.table.snapshot(), "Member list");
        }

        Some(summary)
    }
}
