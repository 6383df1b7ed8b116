use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{error, info, trace, warn};

use crate::transport::{RequestHandler, Transport};

pub struct UdpTransport {
    socket: UdpSocket,
    max_datagram_size: usize,
    cancel: Notify,
}
impl UdpTransport {
    pub async fn new(self_addr: SocketAddr, max_datagram_size: usize) -> anyhow::Result<UdpTransport> {
        let socket = UdpSocket::bind(self_addr).await?;
        info!("bound relay socket to {:?}", socket.local_addr()?);

        Ok(UdpTransport {
            socket,
            max_datagram_size,
            cancel: Notify::new(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn recv_loop(&self, handler: Arc<dyn RequestHandler>) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.max_datagram_size];

        trace!("starting UDP receive loop");

        loop {
            tokio::select! {
                r = self.socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, from)) => {
                            let reply = handler.handle_request(&buf[..len], from).await;
                            // a client going away must not stop the relay
                            if let Err(e) = self.socket.send_to(&reply, from).await {
                                warn!(error = ?e, "error replying to {:?}", from);
                            }
                        }
                        Err(e) => {
                            error!(error = ?e, "error receiving from datagram socket");
                            return Err(e.into());
                        }
                    }
                }
                _ = self.cancel.notified() => break,
            }
        }

        info!("shutting down receive loop");
        Ok(())
    }

    /// Stops the receive loop. If the loop is not running yet, it stops as soon as it starts.
    fn cancel_recv_loop(&self) {
        self.cancel.notify_one();
    }
}
