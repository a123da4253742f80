mod disseminator;
mod receiver;

use crate::{
    common::{split_endpoint, Endpoint},
    config::Config,
    error::{Error, Result},
    handle::Handle,
    membership::MembershipTable,
    transport::{Transport, UdpTransport},
};
use disseminator::Disseminator;
use receiver::Receiver;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span};
use tracing_futures::Instrument;

/// A gossip participant.
///
/// A node owns the transport and the membership table. `run` drives the
/// send and receive loops until the node is shut down through its `Handle`.
pub struct Node<T> {
    config: Config,
    table: MembershipTable,
    transport: Arc<T>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Node<UdpTransport> {
    /// Bind a UDP socket and build a node around it.
    ///
    /// The socket is bound to `config.bind_addr` if set, otherwise to the
    /// wildcard address on the port of `local`.
    ///
    /// # Errors
    ///
    /// * `InvalidEndpoint`: `local` is not `host:port`.
    /// * `Bind`: the socket could not be bound.
    pub async fn bind_udp<I>(config: Config, local: impl Into<Endpoint>, peers: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Endpoint>,
    {
        let local = local.into();
        let (_, port) = split_endpoint(&local)?;

        let addr = config
            .bind_addr
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
        let transport = UdpTransport::bind(addr).await?;

        info!(%local, %addr, "Bound gossip socket");

        Ok(Node::new(config, local, peers, transport))
    }
}

impl<T: Transport> Node<T> {
    pub fn new<I>(config: Config, local: impl Into<Endpoint>, peers: I, transport: T) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Endpoint>,
    {
        let table = MembershipTable::bootstrap(local, peers, &config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            table,
            transport: Arc::new(transport),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.table.clone(), self.shutdown_tx.clone())
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the node until it is shut down.
    ///
    /// Arms the failure timer of every bootstrap peer, then runs the send and
    /// receive loops side by side.
    ///
    /// # Errors
    ///
    /// * `Recv`: the receive loop gave up.
    /// * `Shutdown`: one of the loops panicked.
    ///
    /// Either loop ending stops the other before this returns.
    pub async fn run(self) -> Result<()> {
        let Node {
            config,
            table,
            transport,
            shutdown_tx,
            shutdown_rx,
        } = self;

        let local = table.local().clone();
        let armed = table.start_timers();
        info!(%local, members = table.len(), armed, "Starting gossip node");
        debug!(members = ?table.snapshot(), "Original member list");

        let disseminator = Disseminator::new(table.clone(), transport.clone(), &config);
        let receiver = Receiver::new(table.clone(), transport, &config);

        let mut send = tokio::spawn(
            disseminator
                .run(shutdown_rx.clone())
                .instrument(info_span!("disseminator", %local)),
        );
        let mut recv = tokio::spawn(
            receiver
                .run(shutdown_rx)
                .instrument(info_span!("receiver", %local)),
        );

        // Whichever loop ends first, for whatever reason, takes the other one
        // down with it.
        let (sent, received) = tokio::select! {
            sent = &mut send => {
                if !*shutdown_tx.borrow() {
                    error!(%local, "Disseminator ended unexpectedly, stopping node");
                }
                let _ = shutdown_tx.send(true);
                (sent, recv.await)
            }
            received = &mut recv => {
                let _ = shutdown_tx.send(true);
                (send.await, received)
            }
        };

        info!(%local, "Gossip node stopped");

        sent.map_err(|e| Error::new_shutdown(Some(Box::new(e))))?;
        received.map_err(|e| Error::new_shutdown(Some(Box::new(e))))?
    }
}

impl<T> std::fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("config", &self.config)
            .field("table", &self.table)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, protocol, transport::mock::Mock};
    use std::{io, time::Duration};
    use tokio::time;

    const A: &str = "10.0.0.1:7000";
    const B: &str = "10.0.0.2:7000";

    #[tokio::test(start_paused = true)]
    async fn run_gossips_and_stops() {
        let (_tx, mock) = Mock::new();
        let node = Node::new(Config::local(), A, vec![A, B], mock);
        let handle = node.handle();
        let transport = node.transport.clone();

        let task = tokio::spawn(node.run());

        time::sleep(Duration::from_millis(550)).await;
        handle.shutdown();
        task.await.unwrap().unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 5);
        assert!(sent.iter().all(|(to, _)| to == B));

        let last = protocol::decode(&sent[4].1, 1400).unwrap();
        assert_eq!(last[0], protocol::MemberRecord::new(A, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_peers_time_out() {
        let (_tx, mock) = Mock::new();
        let node = Node::new(Config::local(), A, vec![A, B], mock);
        let handle = node.handle();

        let task = tokio::spawn(node.run());

        time::sleep(Duration::from_millis(11_050)).await;
        assert_eq!(handle.members(), vec![protocol::MemberRecord::new(A, 110)]);
        assert_eq!(handle.dead_members(), vec![protocol::MemberRecord::new(B, 0)]);

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_run() {
        let (_tx, mock) = Mock::new();
        let node = Node::new(Config::local(), A, vec![B], mock);
        node.handle().shutdown();

        node.run().await.unwrap();
    }

    #[tokio::test]
    async fn receive_failure_stops_node() {
        let (tx, mock) = Mock::new();
        let config = Config::local().with_max_consecutive_recv_errors(2);
        let node = Node::new(config, A, vec![B], mock);

        tx.send(Err(io::ErrorKind::Other.into())).unwrap();
        tx.send(Err(io::ErrorKind::Other.into())).unwrap();

        let err = node.run().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Recv);
    }

    #[tokio::test(start_paused = true)]
    async fn send_loop_failure_stops_node() {
        let (_tx, mock) = Mock::new();
        let node = Node::new(Config::local(), A, vec![A, B], mock.panicking_sends());
        let handle = node.handle();

        let result = time::timeout(Duration::from_secs(2), node.run()).await;

        let err = result.expect("node kept running").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shutdown);
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn bind_udp_rejects_bad_endpoint() {
        let err = Node::bind_udp(Config::local(), "no-port", Vec::<String>::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEndpoint);
    }
}
