pub mod relay_handler;
pub mod udp;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
#[cfg(test)] use mockall::automock;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Request / response transport: every received request is answered with exactly one reply.
#[async_trait]
pub trait Transport : Sync + Send {
    fn local_addr(&self) -> anyhow::Result<SocketAddr>;

    async fn recv_loop(&self, handler: Arc<dyn RequestHandler>) -> anyhow::Result<()>;

    fn cancel_recv_loop(&self);
}


/// This trait decouples receiving and replying (the transport's job) from turning a request into
///  a reply (always the same, part of the relay core).
///
/// It is passed around as an `Arc<dyn ...>` to minimize dependencies of [Transport] implementations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RequestHandler : Sync + Send {
    async fn handle_request(&self, buf: &[u8], sender: SocketAddr) -> BytesMut;
}


/// The first byte of every reply. Protocol level outcomes (including errors) are reported inside
///  the frame that follows an `Ok` status; `BadRequest` means the request could not be decoded
///  at all, and no frame follows.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TransportStatus {
    Ok = 0,
    BadRequest = 1,
}
