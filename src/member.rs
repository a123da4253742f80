use crate::{
    common::{Endpoint, Heartbeat},
    protocol::MemberRecord,
    timer::{FailureTimer, TimerState},
};
use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// A node as seen by the local membership table.
///
/// Identity is the endpoint alone: two `Member`s for the same endpoint are
/// equal whatever their heartbeat.
pub struct Member {
    endpoint: Endpoint,
    heartbeat: Heartbeat,
    /// Distinguishes successive `Member` objects for the same endpoint, so a
    /// late timer for an old incarnation cannot remove its successor.
    instance: u64,
    timer: Option<FailureTimer>,
}

impl Member {
    /// The local node. It never times itself out, so it carries no timer.
    pub(crate) fn local(endpoint: Endpoint, heartbeat: Heartbeat, instance: u64) -> Self {
        Self {
            endpoint,
            heartbeat,
            instance,
            timer: None,
        }
    }

    pub(crate) fn remote(
        endpoint: Endpoint,
        heartbeat: Heartbeat,
        instance: u64,
        timer: FailureTimer,
    ) -> Self {
        Self {
            endpoint,
            heartbeat,
            instance,
            timer: Some(timer),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn heartbeat(&self) -> Heartbeat {
        self.heartbeat
    }

    pub(crate) fn instance(&self) -> u64 {
        self.instance
    }

    /// Raise the heartbeat. Lower or equal values are ignored.
    ///
    /// Returns `true` if the heartbeat moved.
    pub(crate) fn observe(&mut self, heartbeat: Heartbeat) -> bool {
        if heartbeat > self.heartbeat {
            self.heartbeat = heartbeat;
            true
        } else {
            false
        }
    }

    /// Bump the heartbeat by one. Sticks at `Heartbeat::MAX` rather than
    /// wrapping, a peer may have pushed us there.
    pub(crate) fn increment(&mut self) -> Heartbeat {
        self.heartbeat = self.heartbeat.saturating_add(1);
        self.heartbeat
    }

    pub(crate) fn timer_mut(&mut self) -> Option<&mut FailureTimer> {
        self.timer.as_mut()
    }

    pub(crate) fn replace_timer(&mut self, instance: u64, timer: FailureTimer) {
        self.instance = instance;
        self.timer = Some(timer);
    }

    pub(crate) fn timer_state(&self) -> Option<TimerState> {
        self.timer.as_ref().map(FailureTimer::state)
    }

    /// Fresh evidence of life: push the failure deadline out.
    pub(crate) fn reset_timer(&self) -> bool {
        self.timer.as_ref().map_or(false, FailureTimer::reset)
    }

    /// Detach and cancel the timer, leaving a plain record behind.
    pub(crate) fn into_dead(mut self) -> Self {
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
        self
    }

    pub fn record(&self) -> MemberRecord {
        MemberRecord::new(self.endpoint.clone(), self.heartbeat)
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}

impl Eq for Member {}

impl Hash for Member {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state);
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Member")
            .field("endpoint", &self.endpoint)
            .field("heartbeat", &self.heartbeat)
            .field("timer", &self.timer_state())
            .finish()
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (heartbeat {})", self.endpoint, self.heartbeat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn identity_is_endpoint() {
        let a = Member::local("a:1".into(), 3, 0);
        let b = Member::remote("a:1".into(), 9, 1, FailureTimer::new(Duration::from_secs(1)));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn observe_only_raises() {
        let mut m = Member::local("a:1".into(), 5, 0);
        assert!(!m.observe(4));
        assert!(!m.observe(5));
        assert_eq!(m.heartbeat(), 5);
        assert!(m.observe(6));
        assert_eq!(m.heartbeat(), 6);
        assert_eq!(m.increment(), 7);
    }

    #[test]
    fn increment_saturates() {
        let mut m = Member::local("a:1".into(), Heartbeat::MAX - 1, 0);
        assert_eq!(m.increment(), Heartbeat::MAX);
        assert_eq!(m.increment(), Heartbeat::MAX);
        assert_eq!(m.heartbeat(), Heartbeat::MAX);
    }

    #[test]
    fn local_has_no_timer() {
        let m = Member::local("a:1".into(), 0, 0);
        assert_eq!(m.timer_state(), None);
        assert!(!m.reset_timer());
        assert_eq!(m.record(), MemberRecord::new("a:1", 0));
    }

    #[test]
    fn into_dead_cancels() {
        let m = Member::remote("a:1".into(), 2, 0, FailureTimer::new(Duration::from_secs(1)));
        let dead = m.into_dead();
        assert_eq!(dead.timer_state(), None);
        assert_eq!(dead.heartbeat(), 2);
    }
}
