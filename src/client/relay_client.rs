use std::net::SocketAddr;
use std::time::Duration;

use anyhow::anyhow;
use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::trace;

use crate::frame::frame_model::{ClientId, Request, Response};
use crate::transport::relay_handler::decode_response;

const RECEIVE_BUFFER_SIZE: usize = 64 * 1024;

/// A client talking to a relay on behalf of one client id.
///
/// Requests are sent one at a time, each waiting for its response: methods take `&mut self` so
///  responses can not get mixed up between concurrent requests. There are no retries, and a
///  response that arrives after its request timed out is discarded.
pub struct RelayClient {
    socket: UdpSocket,
    client_id: ClientId,
    request_timeout: Duration,
    recv_buf: Vec<u8>,
}
impl RelayClient {
    pub async fn connect(server_addr: SocketAddr, client_id: ClientId, request_timeout: Duration) -> anyhow::Result<RelayClient> {
        let bind_addr = if server_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server_addr).await?;

        Ok(RelayClient {
            socket,
            client_id,
            request_timeout,
            recv_buf: vec![0u8; RECEIVE_BUFFER_SIZE],
        })
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub async fn associate(&mut self) -> anyhow::Result<Response> {
        let request = Request::Associate { client_id: self.client_id.clone() };
        self.request(&request).await
    }

    pub async fn push(&mut self, recipient_id: ClientId, payload: Bytes) -> anyhow::Result<Response> {
        let request = Request::Push {
            client_id: self.client_id.clone(),
            recipient_id,
            declared_length: payload.len() as u64,
            payload,
        };
        self.request(&request).await
    }

    pub async fn get(&mut self) -> anyhow::Result<Response> {
        let request = Request::Get { client_id: self.client_id.clone() };
        self.request(&request).await
    }

    pub async fn request(&mut self, request: &Request) -> anyhow::Result<Response> {
        self.drain_late_responses()?;

        let mut buf = BytesMut::new();
        request.to_raw().ser(&mut buf);
        trace!(?request, "sending request");
        self.socket.send(&buf).await?;

        let len = timeout(self.request_timeout, self.socket.recv(&mut self.recv_buf)).await
            .map_err(|_| anyhow!("no response from relay within {:?}", self.request_timeout))??;
        let response = decode_response(&self.recv_buf[..len])?;
        trace!(?response, "received response");
        Ok(response)
    }

    /// discards responses to earlier requests that timed out on our side
    fn drain_late_responses(&mut self) -> anyhow::Result<()> {
        loop {
            match self.socket.try_recv(&mut self.recv_buf) {
                Ok(len) => trace!("discarding late response of {} bytes", len),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
