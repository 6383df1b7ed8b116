use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::frame::frame_model::Response;
use crate::frame::raw_frame::RawFrame;
use crate::relay::dispatcher::Dispatcher;
use crate::transport::{RequestHandler, TransportStatus};

/// Adapts the [Dispatcher] to a byte-level transport: it decodes the request, hands it to the
///  dispatcher together with the current time, and encodes the response.
pub struct RelayRequestHandler {
    dispatcher: Arc<Dispatcher>,
    max_datagram_size: usize,
}
impl RelayRequestHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, max_datagram_size: usize) -> RelayRequestHandler {
        RelayRequestHandler {
            dispatcher,
            max_datagram_size,
        }
    }

    fn bad_request() -> BytesMut {
        let mut buf = BytesMut::with_capacity(1);
        buf.put_u8(TransportStatus::BadRequest.into());
        buf
    }
}

#[async_trait]
impl RequestHandler for RelayRequestHandler {
    async fn handle_request(&self, buf: &[u8], sender: SocketAddr) -> BytesMut {
        trace!("received request from {:?}: {:?}", sender, buf);

        if buf.len() >= self.max_datagram_size {
            warn!("received a datagram from {:?} filling the entire receive buffer of {} bytes - it is probably truncated, rejecting", sender, self.max_datagram_size);
            return Self::bad_request();
        }

        let raw = match RawFrame::try_deser(buf) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("received a request from {:?} that can not be decoded - rejecting: {}", sender, e);
                return Self::bad_request();
            }
        };

        let response = self.dispatcher.handle(&raw, Instant::now());
        encode_response(&response)
    }
}

pub fn encode_response(response: &Response) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(TransportStatus::Ok.into());
    response.to_raw().ser(&mut buf);
    buf
}

/// The client side counterpart of [encode_response]
pub fn decode_response(mut buf: &[u8]) -> anyhow::Result<Response> {
    match TransportStatus::try_from(buf.try_get_u8()?)? {
        TransportStatus::Ok => {
            let raw = RawFrame::try_deser(buf)?;
            Ok(Response::parse(&raw)?)
        }
        TransportStatus::BadRequest => bail!("the relay could not decode the request"),
    }
}


#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::frame::frame_model::{ClientId, FrameType};
    use crate::relay::relay_config::RelayConfig;
    use crate::relay::relay_state::RelayState;
    use crate::test_util::frames::{associate_frame, get_frame, push_frame};
    use super::*;

    const MAX_DATAGRAM_SIZE: usize = 2048;

    fn handler() -> RelayRequestHandler {
        let config = Arc::new(RelayConfig::new("127.0.0.1:0".parse().unwrap()));
        let state = Arc::new(RelayState::new(&config));
        RelayRequestHandler::new(Arc::new(Dispatcher::new(config, state)), MAX_DATAGRAM_SIZE)
    }

    fn sender() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    async fn send(handler: &RelayRequestHandler, raw: &RawFrame) -> Response {
        let mut buf = BytesMut::new();
        raw.ser(&mut buf);
        let reply = handler.handle_request(&buf, sender()).await;
        decode_response(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_scenario() {
        let handler = handler();

        assert_eq!(send(&handler, &associate_frame(3)).await, Response::AssociationSuccess { client_id: ClientId::Num(3) });
        assert_eq!(send(&handler, &associate_frame(7)).await, Response::AssociationSuccess { client_id: ClientId::Num(7) });
        assert_eq!(send(&handler, &push_frame(3, 7, b"hi")).await, Response::PushSuccess { client_id: ClientId::Num(3) });
        assert_eq!(send(&handler, &get_frame(7)).await, Response::GetResponse {
            client_id: ClientId::Num(7),
            sender_id: ClientId::Num(3),
            payload: Bytes::from_static(b"hi"),
        });
        assert_eq!(send(&handler, &get_frame(7)).await, Response::BufferEmpty { client_id: ClientId::Num(7) });
    }

    #[tokio::test]
    async fn test_malformed_frame_is_a_protocol_response() {
        let handler = handler();
        assert_eq!(send(&handler, &RawFrame::new()).await, Response::MalformedFrame { frame_type: FrameType::Management, client_id: None });
    }

    #[tokio::test]
    async fn test_undecodable_request() {
        let handler = handler();
        let reply = handler.handle_request(b"garbage", sender()).await;
        assert_eq!(&reply[..], &[u8::from(TransportStatus::BadRequest)]);
        assert!(decode_response(&reply).is_err());
    }

    #[tokio::test]
    async fn test_corrupted_request() {
        let handler = handler();
        let mut buf = BytesMut::new();
        associate_frame(3).ser(&mut buf);
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let reply = handler.handle_request(&buf, sender()).await;
        assert_eq!(&reply[..], &[u8::from(TransportStatus::BadRequest)]);
    }

    #[tokio::test]
    async fn test_datagram_filling_buffer_is_rejected() {
        let handler = handler();
        let reply = handler.handle_request(&[0u8; MAX_DATAGRAM_SIZE], sender()).await;
        assert_eq!(&reply[..], &[u8::from(TransportStatus::BadRequest)]);
    }

    #[test]
    fn test_decode_empty_reply() {
        assert!(decode_response(b"").is_err());
    }
}
