//! Heartbeat gossip cluster membership.
//!
//! Every node keeps a table of the members it believes alive and dead. Once
//! per gossip interval it bumps its own heartbeat and sends the alive list to
//! one random peer; whatever it receives is merged by keeping the highest
//! heartbeat per endpoint. A member whose heartbeat has not gone up within the
//! cleanup timeout is moved to the dead set, and comes back if a higher
//! heartbeat for it shows up later.

pub mod bootstrap;
mod common;
mod config;
mod error;
mod event;
mod handle;
mod member;
mod membership;
mod node;
mod protocol;
mod timer;
mod transport;

#[cfg(test)]
mod test_utils;

pub use crate::{
    common::{Endpoint, Heartbeat},
    config::Config,
    error::{Error, ErrorKind, Result},
    event::Event,
    handle::Handle,
    membership::{MembershipTable, MergeSummary},
    node::Node,
    protocol::{decode, encode, MemberRecord},
    timer::{FailureTimer, TimerState},
    transport::{Transport, UdpTransport},
};
