use crate::{
    common::Endpoint,
    config::Config,
    error::{Error, Result},
    membership::MembershipTable,
    protocol,
    transport::Transport,
};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, trace, warn};
use tracing_attributes::instrument;

/// The send half of a node: once per interval, tell one random peer
/// everything we believe is alive.
pub(crate) struct Disseminator<T> {
    table: MembershipTable,
    transport: Arc<T>,
    interval: Duration,
    loss_threshold: Option<u32>,
    max_payload: usize,
    rng: StdRng,
}

impl<T: Transport> Disseminator<T> {
    pub(crate) fn new(table: MembershipTable, transport: Arc<T>, config: &Config) -> Self {
        Self::with_rng(table, transport, config, StdRng::from_entropy())
    }

    pub(crate) fn with_rng(
        table: MembershipTable,
        transport: Arc<T>,
        config: &Config,
        rng: StdRng,
    ) -> Self {
        Self {
            table,
            transport,
            interval: config.gossip_interval,
            loss_threshold: config.loss_threshold,
            max_payload: config.max_payload,
            rng,
        }
    }

    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        // First round one interval after start, not immediately.
        let mut ticks = time::interval_at(Instant::now() + self.interval, self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticks.tick() => {
                    if let Err(error) = self.gossip().await {
                        warn!(%error, "Gossip round abandoned");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        debug!("Disseminator stopped");
    }

    /// One gossip round.
    ///
    /// Returns the peer the member list was sent to, or `None` when there was
    /// nobody to send to or the simulated loss swallowed the datagram.
    #[instrument(level = "trace", skip(self))]
    pub(crate) async fn gossip(&mut self) -> Result<Option<Endpoint>> {
        let heartbeat = self.table.increment_heartbeat();

        let peer = match self.table.select_random_peer(&mut self.rng) {
            Some(peer) => peer,
            None => {
                debug!(heartbeat, "Alone!");
                return Ok(None);
            }
        };

        let mut members = self.table.snapshot();
        // Fair coverage when the list has to be cut to fit a datagram.
        members.shuffle(&mut self.rng);
        let payload = protocol::encode(self.table.local(), &members, self.max_payload)?;

        if !should_transmit(&mut self.rng, self.loss_threshold) {
            trace!(%peer, heartbeat, "Simulated loss, datagram dropped");
            return Ok(None);
        }

        self.transport
            .send_to(&peer, &payload)
            .await
            .map_err(|e| Error::new_send(Some(Box::new(e))))?;

        trace!(
            %peer,
            heartbeat,
            members = members.len(),
            bytes = payload.len(),
            "Sent member list"
        );

        Ok(Some(peer))
    }
}

/// Simulated packet loss: draw in `0..100` and send only above the threshold.
pub(crate) fn should_transmit<R: Rng + ?Sized>(rng: &mut R, threshold: Option<u32>) -> bool {
    match threshold {
        Some(threshold) => rng.gen_range(0..100) > threshold,
        None => true,
    }
}
