use crate::{
    common::Endpoint,
    error::{Error, Result},
};
use async_trait::async_trait;
use std::{io, net::SocketAddr};
use tokio::net::UdpSocket;

/// Datagram transport used by the gossip loops.
///
/// Both loops share one transport, so sending and receiving take `&self`.
/// Delivery is best effort: a successful `send_to` says nothing about the
/// datagram arriving.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn send_to(&self, target: &str, payload: &[u8]) -> std::result::Result<(), Self::Error>;

    /// Wait for the next datagram and copy it into `buf`. Datagrams longer
    /// than `buf` are cut short.
    async fn recv_from(&self, buf: &mut [u8]) -> std::result::Result<(usize, Endpoint), Self::Error>;
}

#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::new_bind(Some(Box::new(e))))?;

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    type Error = io::Error;

    async fn send_to(&self, target: &str, payload: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(payload, target).await?;

        if sent < payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {} of {} bytes", sent, payload.len()),
            ));
        }

        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Endpoint)> {
        let (len, from) = self.socket.recv_from(buf).await?;
        Ok((len, from.to_string()))
    }
}

#[cfg(test)]
pub mod mock {
    use super::Transport;
    use crate::common::Endpoint;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::io;
    use tokio::sync::mpsc;

    type Inbound = io::Result<(Endpoint, Vec<u8>)>;

    /// Records every send and replays whatever the test pushes as inbound.
    pub struct Mock {
        sent: Mutex<Vec<(Endpoint, Vec<u8>)>>,
        fail_sends: bool,
        panic_sends: bool,
        rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    }

    impl Mock {
        pub fn new() -> (mpsc::UnboundedSender<Inbound>, Self) {
            let (tx, rx) = mpsc::unbounded_channel();

            let this = Self {
                sent: Mutex::new(Vec::new()),
                fail_sends: false,
                panic_sends: false,
                rx: tokio::sync::Mutex::new(rx),
            };

            (tx, this)
        }

        pub fn failing_sends(mut self) -> Self {
            self.fail_sends = true;
            self
        }

        pub fn panicking_sends(mut self) -> Self {
            self.panic_sends = true;
            self
        }

        pub fn sent(&self) -> Vec<(Endpoint, Vec<u8>)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for Mock {
        type Error = io::Error;

        async fn send_to(&self, target: &str, payload: &[u8]) -> io::Result<()> {
            if self.panic_sends {
                panic!("send to {} blew up", target);
            }

            if self.fail_sends {
                return Err(io::ErrorKind::ConnectionRefused.into());
            }

            self.sent.lock().push((target.to_string(), payload.to_vec()));
            Ok(())
        }

        async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Endpoint)> {
            let next = self.rx.lock().await.recv().await;

            match next {
                Some(Ok((from, data))) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok((len, from))
                }
                Some(Err(e)) => Err(e),
                // Nothing more will ever arrive.
                None => futures::future::pending().await,
            }
        }
    }
}
