use std::{net::SocketAddr, time::Duration};

/// Tunables for a gossip node.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Time between two gossip rounds. Every round bumps the local heartbeat
    /// and sends the alive list to one random peer.
    pub gossip_interval: Duration,

    /// How long a member may go without a heartbeat increase before it is
    /// declared dead.
    ///
    /// This should be many gossip intervals long so that a few lost
    /// datagrams do not kill a healthy member.
    pub cleanup_timeout: Duration,

    /// Simulated packet loss. Each round draws a number in `0..100` and only
    /// sends when the draw is greater than this threshold. `None` always
    /// sends.
    pub loss_threshold: Option<u32>,

    /// How many random draws are made when looking for a peer other than
    /// ourselves.
    pub peer_selection_attempts: usize,

    /// Largest datagram this node sends or accepts, in bytes.
    pub max_payload: usize,

    /// The receive loop stops after this many receive errors in a row.
    pub max_consecutive_recv_errors: usize,

    /// Capacity of the membership event channel.
    pub event_capacity: usize,

    /// Address to bind the gossip socket to. Defaults to the wildcard
    /// address on the local endpoint's port.
    pub bind_addr: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gossip_interval: Duration::from_millis(100),
            cleanup_timeout: Duration::from_secs(10),
            loss_threshold: Some(30),
            peer_selection_attempts: 15,
            max_payload: 1400,
            max_consecutive_recv_errors: 16,
            event_capacity: 64,
            bind_addr: None,
        }
    }
}

impl Config {
    /// Like `default`, but without simulated loss. Meant for loopback
    /// clusters and tests.
    pub fn local() -> Self {
        Config::default().with_loss_threshold(None)
    }

    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }

    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn with_loss_threshold(mut self, threshold: Option<u32>) -> Self {
        self.loss_threshold = threshold;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn with_max_consecutive_recv_errors(mut self, max: usize) -> Self {
        self.max_consecutive_recv_errors = max;
        self
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }
}
