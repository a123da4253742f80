use crate::common::Endpoint;

/// A change in the local view of the cluster.
#[derive(Debug, PartialEq, Clone)]
pub enum Event {
    /// A previously unknown endpoint was learned through gossip.
    Discovered(Endpoint),
    /// A dead endpoint came back with a higher heartbeat.
    Rejoined(Endpoint),
    /// A member's failure timer expired.
    Failed(Endpoint),
    /// A member was taken out of the alive set by hand.
    Removed(Endpoint),
}

impl Event {
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Event::Discovered(e) | Event::Rejoined(e) | Event::Failed(e) | Event::Removed(e) => e,
        }
    }
}
