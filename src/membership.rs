//! The local view of the cluster.
//!
//! Two maps make up the view: `alive` and `dead`. An endpoint lives in
//! exactly one of them once known. Whenever both maps are needed the `dead`
//! lock is taken before the `alive` lock; code that only reads or bumps
//! heartbeats takes the `alive` lock alone. Locks are never held across an
//! `.await`. Membership events are published before the locks are released.

use crate::{
    common::{Endpoint, Heartbeat},
    config::Config,
    event::Event,
    member::Member,
    protocol::MemberRecord,
    timer::{FailureTimer, TimerState},
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::Rng;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Shared handle to the membership view. Clones refer to the same view.
#[derive(Clone)]
pub struct MembershipTable {
    inner: Arc<Inner>,
}

struct Inner {
    local: Endpoint,
    timeout: Duration,
    peer_selection_attempts: usize,
    next_instance: AtomicU64,
    dead: Mutex<IndexMap<Endpoint, Member>>,
    alive: Mutex<IndexMap<Endpoint, Member>>,
    events: broadcast::Sender<Event>,
}

/// What a call to `merge` did with each incoming record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    /// Known live members whose heartbeat went up.
    pub updated: usize,
    /// Endpoints we had never heard of.
    pub discovered: usize,
    /// Dead endpoints that came back with a higher heartbeat.
    pub rejoined: usize,
    /// Records that were no fresher than what we already had.
    pub ignored: usize,
}

impl MergeSummary {
    pub fn changed(&self) -> bool {
        self.updated + self.discovered + self.rejoined > 0
    }
}

impl MembershipTable {
    /// A table holding only the local member.
    pub fn new(local: impl Into<Endpoint>, config: &Config) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let local = local.into();

        let table = MembershipTable {
            inner: Arc::new(Inner {
                local: local.clone(),
                timeout: config.cleanup_timeout,
                peer_selection_attempts: config.peer_selection_attempts,
                next_instance: AtomicU64::new(0),
                dead: Mutex::new(IndexMap::new()),
                alive: Mutex::new(IndexMap::new()),
                events,
            }),
        };

        let instance = table.next_instance();
        table
            .inner
            .alive
            .lock()
            .insert(local.clone(), Member::local(local, 0, instance));

        table
    }

    /// A table holding the local member plus every bootstrap peer at
    /// heartbeat zero. Peer timers stay idle until `start_timers`.
    pub fn bootstrap<I>(local: impl Into<Endpoint>, peers: I, config: &Config) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Endpoint>,
    {
        let table = MembershipTable::new(local, config);

        {
            let mut alive = table.inner.alive.lock();
            for peer in peers {
                let peer = peer.into();
                if alive.contains_key(&peer) {
                    continue;
                }

                let member = Member::remote(
                    peer.clone(),
                    0,
                    table.next_instance(),
                    FailureTimer::new(table.inner.timeout),
                );
                alive.insert(peer, member);
            }
        }

        table
    }

    /// Arm the failure timer of every member that has not been armed yet.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_timers(&self) -> usize {
        let mut alive = self.inner.alive.lock();
        let mut started = 0;

        for member in alive.values_mut() {
            if member.timer_state() == Some(TimerState::Idle) {
                self.arm(member);
                started += 1;
            }
        }

        debug!(started, "Armed failure timers");
        started
    }

    pub fn local(&self) -> &Endpoint {
        &self.inner.local
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Bump our own heartbeat. This is the only way the local heartbeat
    /// grows on its own.
    pub fn increment_heartbeat(&self) -> Heartbeat {
        let mut alive = self.inner.alive.lock();
        alive
            .get_mut(&self.inner.local)
            .map(Member::increment)
            .unwrap_or_default()
    }

    /// Pick a live member other than ourselves, uniformly at random.
    ///
    /// Draws at most `peer_selection_attempts` times and gives up if every
    /// draw landed on the local member. Returns `None` straight away when we
    /// are alone.
    pub fn select_random_peer<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Endpoint> {
        let alive = self.inner.alive.lock();

        if alive.len() < 2 {
            return None;
        }

        for _ in 0..self.inner.peer_selection_attempts {
            let (endpoint, _) = alive.get_index(rng.gen_range(0..alive.len()))?;
            if *endpoint != self.inner.local {
                return Some(endpoint.clone());
            }
        }

        None
    }

    /// Reconcile a remote member list with the local view.
    ///
    /// Per record, the higher heartbeat wins:
    /// - a live member with a lower heartbeat takes the remote one and its
    ///   failure timer is reset;
    /// - a dead member with a lower heartbeat is brought back as a new
    ///   member with a fresh timer;
    /// - an unknown endpoint is added with a fresh timer.
    ///
    /// Everything else is stale and ignored. Since heartbeats only ever move
    /// up, merging the same list twice is the same as merging it once.
    pub fn merge(&self, remote: &[MemberRecord]) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let mut events = Vec::new();

        {
            let mut dead = self.inner.dead.lock();
            let mut alive = self.inner.alive.lock();

            for record in remote {
                if let Some(local) = alive.get_mut(&record.endpoint) {
                    if local.observe(record.heartbeat) {
                        self.refresh(local);
                        summary.updated += 1;
                    } else {
                        summary.ignored += 1;
                    }
                    continue;
                }

                if let Some(previous) = dead.get(&record.endpoint) {
                    if record.heartbeat <= previous.heartbeat() {
                        summary.ignored += 1;
                        continue;
                    }

                    dead.swap_remove(&record.endpoint);
                    info!(
                        endpoint = %record.endpoint,
                        heartbeat = record.heartbeat,
                        "Member rejoined"
                    );
                    events.push(Event::Rejoined(record.endpoint.clone()));
                    summary.rejoined += 1;
                } else {
                    info!(
                        endpoint = %record.endpoint,
                        heartbeat = record.heartbeat,
                        "Discovered member"
                    );
                    events.push(Event::Discovered(record.endpoint.clone()));
                    summary.discovered += 1;
                }

                let member = self.spawn_member(record.endpoint.clone(), record.heartbeat);
                alive.insert(record.endpoint.clone(), member);
            }

            self.publish(events);
        }

        summary
    }

    /// Put a member into the alive set with an armed timer.
    ///
    /// A dead endpoint is brought back whatever its heartbeat; a live one
    /// behaves as in `merge`. Returns `true` if the endpoint was not alive
    /// before.
    pub fn add(&self, endpoint: impl Into<Endpoint>, heartbeat: Heartbeat) -> bool {
        let endpoint = endpoint.into();

        let mut dead = self.inner.dead.lock();
        let mut alive = self.inner.alive.lock();

        if let Some(member) = alive.get_mut(&endpoint) {
            if member.observe(heartbeat) {
                self.refresh(member);
            }
            return false;
        }

        let event = match dead.swap_remove(&endpoint) {
            Some(previous) => {
                let heartbeat = heartbeat.max(previous.heartbeat());
                alive.insert(endpoint.clone(), self.spawn_member(endpoint.clone(), heartbeat));
                Event::Rejoined(endpoint)
            }
            None => {
                alive.insert(endpoint.clone(), self.spawn_member(endpoint.clone(), heartbeat));
                Event::Discovered(endpoint)
            }
        };

        info!(endpoint = %event.endpoint(), heartbeat, "Added member");
        self.publish(vec![event]);
        true
    }

    /// Take a member out of the alive set and record it as dead, cancelling
    /// its timer. The local member cannot be removed.
    pub fn remove(&self, endpoint: &str) -> bool {
        if endpoint == self.inner.local {
            return false;
        }

        let mut dead = self.inner.dead.lock();
        let mut alive = self.inner.alive.lock();

        let member = match alive.swap_remove(endpoint) {
            Some(member) => member.into_dead(),
            None => return false,
        };

        info!(endpoint, heartbeat = member.heartbeat(), "Removed member");
        dead.insert(member.endpoint().clone(), member);

        self.publish(vec![Event::Removed(endpoint.to_string())]);
        true
    }

    /// Called by a fired failure timer.
    ///
    /// Moves the member into the dead set with its last heartbeat. Does
    /// nothing if the member is already gone or has been replaced by a newer
    /// instance since the timer was armed.
    pub(crate) fn on_failure_detected(&self, endpoint: &str, instance: u64) -> bool {
        let mut dead = self.inner.dead.lock();
        let mut alive = self.inner.alive.lock();

        match alive.get(endpoint) {
            Some(member) if member.instance() == instance => {}
            _ => return false,
        }

        let member = match alive.swap_remove(endpoint) {
            Some(member) => member.into_dead(),
            None => return false,
        };

        info!(endpoint, heartbeat = member.heartbeat(), "Dead member detected");
        dead.insert(member.endpoint().clone(), member);

        self.publish(vec![Event::Failed(endpoint.to_string())]);
        true
    }

    /// The alive set as wire records.
    pub fn snapshot(&self) -> Vec<MemberRecord> {
        self.inner.alive.lock().values().map(Member::record).collect()
    }

    /// The dead set with the heartbeats recorded at death.
    pub fn dead_snapshot(&self) -> Vec<MemberRecord> {
        self.inner.dead.lock().values().map(Member::record).collect()
    }

    pub fn is_alive(&self, endpoint: &str) -> bool {
        self.inner.alive.lock().contains_key(endpoint)
    }

    pub fn is_dead(&self, endpoint: &str) -> bool {
        self.inner.dead.lock().contains_key(endpoint)
    }

    /// The heartbeat we hold for an endpoint, alive or dead.
    pub fn heartbeat_of(&self, endpoint: &str) -> Option<Heartbeat> {
        let dead = self.inner.dead.lock();
        let alive = self.inner.alive.lock();

        alive
            .get(endpoint)
            .or_else(|| dead.get(endpoint))
            .map(Member::heartbeat)
    }

    pub fn len(&self) -> usize {
        self.inner.alive.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn timer_state(&self, endpoint: &str) -> Option<TimerState> {
        self.inner
            .alive
            .lock()
            .get(endpoint)
            .and_then(Member::timer_state)
    }

    fn next_instance(&self) -> u64 {
        self.inner.next_instance.fetch_add(1, Ordering::Relaxed)
    }

    fn spawn_member(&self, endpoint: Endpoint, heartbeat: Heartbeat) -> Member {
        let mut member = Member::remote(
            endpoint,
            heartbeat,
            self.next_instance(),
            FailureTimer::new(self.inner.timeout),
        );
        self.arm(&mut member);
        member
    }

    /// Push out the member's deadline after a heartbeat increase.
    ///
    /// If the old timer already fired but its callback has not got the locks
    /// yet, the member gets a new instance and timer so that the pending
    /// callback finds nothing to remove.
    fn refresh(&self, member: &mut Member) {
        if member.reset_timer() {
            return;
        }

        if member.timer_state() == Some(TimerState::Fired) {
            let instance = self.next_instance();
            member.replace_timer(instance, FailureTimer::new(self.inner.timeout));
            self.arm(member);
        }
    }

    fn arm(&self, member: &mut Member) {
        let table: Weak<Inner> = Arc::downgrade(&self.inner);
        let endpoint = member.endpoint().clone();
        let instance = member.instance();

        if let Some(timer) = member.timer_mut() {
            timer.start(move || {
                if let Some(inner) = table.upgrade() {
                    MembershipTable { inner }.on_failure_detected(&endpoint, instance);
                }
            });
        }
    }

    /// Send events out. Callers hold the `dead` lock, so subscribers see
    /// changes to one endpoint in the order the table applied them.
    fn publish(&self, events: Vec<Event>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.inner.events.send(event);
        }
    }
}

impl std::fmt::Debug for MembershipTable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let dead = self.inner.dead.lock();
        let alive = self.inner.alive.lock();

        f.debug_struct("MembershipTable")
            .field("local", &self.inner.local)
            .field("alive", &alive.values().collect::<Vec<_>>())
            .field("dead", &dead.values().collect::<Vec<_>>())
            .finish()
    }
}
