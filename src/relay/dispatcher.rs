use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::frame::frame_model::{ClientId, FrameType, MalformedFrame, MessageCode, Request, Response};
use crate::frame::raw_frame::RawFrame;
use crate::relay::inbox_store::PushResult;
use crate::relay::relay_config::RelayConfig;
use crate::relay::relay_state::RelayState;

/// The protocol state machine. It interprets a request against the shared [RelayState] and
///  produces the response, without any state of its own.
///
/// Handling a request never fails: every protocol level problem is reported as a response code.
///  Checks are done in a fixed order (association first, then the frame's structure, then
///  lengths, then inbox capacity), so the most fundamental problem is reported if there are
///  several.
///
/// Delivery is at-most-once: a message is removed from its inbox when it is handed out in a
///  GET response, regardless of whether the response reaches the client.
pub struct Dispatcher {
    config: Arc<RelayConfig>,
    state: Arc<RelayState>,
}
impl Dispatcher {
    pub fn new(config: Arc<RelayConfig>, state: Arc<RelayState>) -> Dispatcher {
        Dispatcher {
            config,
            state,
        }
    }

    pub fn handle(&self, raw: &RawFrame, now: Instant) -> Response {
        let response = match Request::parse(raw) {
            Ok(request) => self.on_request(request, now),
            Err(malformed) => self.on_malformed(malformed, now),
        };
        trace!(?response, "response");
        response
    }

    fn on_request(&self, request: Request, now: Instant) -> Response {
        trace!(?request, "handling request");

        match request {
            Request::Associate { client_id } => self.on_associate(client_id, now),
            Request::Push { client_id, recipient_id, payload, declared_length } => self.on_push(client_id, recipient_id, payload, declared_length, now),
            Request::Get { client_id } => self.on_get(client_id, now),
            Request::Unknown { frame_type, message_code, client_id } => {
                debug!("unknown message code {} for frame type {:?}", message_code, frame_type);
                Response::UnknownMessage { frame_type, client_id }
            }
        }
    }

    /// A malformed PUSH or GET from a client that is not associated is reported as NOT_ASSOCIATED
    ///  rather than MALFORMED_FRAME, provided the client id could be recovered.
    fn on_malformed(&self, malformed: MalformedFrame, now: Instant) -> Response {
        debug!("{}", malformed);

        if let (Some(frame_type), Some(message_code), Some(client_id)) = (malformed.frame_type, malformed.message_code, &malformed.client_id) {
            let requires_association = matches!(
                (frame_type, message_code),
                (FrameType::Data, MessageCode::Push) | (FrameType::Control, MessageCode::Get)
            );
            if requires_association && !self.is_live(client_id, now) {
                return Response::NotAssociated { frame_type, client_id: client_id.clone() };
            }
        }

        Response::MalformedFrame {
            frame_type: malformed.frame_type.unwrap_or(FrameType::Management),
            client_id: malformed.client_id,
        }
    }

    fn is_live(&self, client_id: &ClientId, now: Instant) -> bool {
        self.state.registry.is_live(client_id, now, self.config.association_timeout)
    }

    fn on_associate(&self, client_id: ClientId, now: Instant) -> Response {
        self.state.registry.associate(&client_id, now);
        debug!("client {} associated", client_id);
        Response::AssociationSuccess { client_id }
    }

    fn on_push(&self, client_id: ClientId, recipient_id: ClientId, payload: Bytes, declared_length: u64, now: Instant) -> Response {
        if !self.is_live(&client_id, now) {
            debug!("push from {}, which is not associated", client_id);
            return Response::NotAssociated { frame_type: FrameType::Data, client_id };
        }

        if declared_length > self.config.max_payload_len as u64 {
            debug!("push from {}: declared length {} exceeds the maximum of {}", client_id, declared_length, self.config.max_payload_len);
            return Response::InvalidLength { client_id };
        }
        if declared_length != payload.len() as u64 {
            debug!("push from {}: declared length {} does not match payload length {}", client_id, declared_length, payload.len());
            return Response::InvalidLength { client_id };
        }

        match self.state.inboxes.push(&recipient_id, &client_id, payload) {
            PushResult::Accepted => {
                debug!("message from {} for {} accepted", client_id, recipient_id);
                Response::PushSuccess { client_id }
            }
            PushResult::Full => {
                debug!("inbox of {} is full - rejecting message from {}", recipient_id, client_id);
                Response::BufferFull { client_id }
            }
        }
    }

    fn on_get(&self, client_id: ClientId, now: Instant) -> Response {
        if !self.is_live(&client_id, now) {
            debug!("get from {}, which is not associated", client_id);
            return Response::NotAssociated { frame_type: FrameType::Control, client_id };
        }

        match self.state.inboxes.pop(&client_id) {
            Some(msg) => {
                debug!("delivering message from {} to {}", msg.sender_id, client_id);
                Response::GetResponse {
                    client_id,
                    sender_id: msg.sender_id,
                    payload: msg.payload,
                }
            }
            None => Response::BufferEmpty { client_id },
        }
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use crate::frame::frame_model::MAX_CLIENT_ID_LEN;
    use crate::frame::raw_frame::{FieldTag, RawValue};
    use crate::test_util::frames::{associate_frame, get_frame, push_frame, push_frame_with_length};
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);
    const MAX_PAYLOAD_LEN: usize = 16;
    const MAX_BUFFER_SIZE: usize = 5;

    fn dispatcher() -> Dispatcher {
        let mut config = RelayConfig::new("127.0.0.1:0".parse().unwrap());
        config.association_timeout = TIMEOUT;
        config.max_payload_len = MAX_PAYLOAD_LEN;
        config.max_buffer_size = MAX_BUFFER_SIZE;

        let state = Arc::new(RelayState::new(&config));
        Dispatcher::new(Arc::new(config), state)
    }

    fn associated(clients: &[i64], now: Instant) -> Dispatcher {
        let dispatcher = dispatcher();
        for &client in clients {
            dispatcher.handle(&associate_frame(client), now);
        }
        dispatcher
    }

    fn id(n: i64) -> ClientId {
        ClientId::Num(n)
    }

    #[test]
    fn test_associate() {
        let dispatcher = dispatcher();
        let now = Instant::now();

        assert_eq!(dispatcher.handle(&associate_frame(7), now), Response::AssociationSuccess { client_id: id(7) });
        assert_eq!(dispatcher.handle(&associate_frame(7), now), Response::AssociationSuccess { client_id: id(7) });
        assert!(dispatcher.state.registry.is_live(&id(7), now + TIMEOUT, TIMEOUT));
    }

    #[test]
    fn test_associate_named_client() {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.handle(&associate_frame("alice"), Instant::now()), Response::AssociationSuccess { client_id: "alice".into() });
    }

    #[test]
    fn test_end_to_end_scenario() {
        let now = Instant::now();
        let dispatcher = associated(&[3], now);

        assert_eq!(dispatcher.handle(&associate_frame(7), now), Response::AssociationSuccess { client_id: id(7) });
        assert_eq!(dispatcher.handle(&push_frame(3, 7, b"hi"), now), Response::PushSuccess { client_id: id(3) });

        let response = dispatcher.handle(&get_frame(7), now);
        assert_eq!(response, Response::GetResponse {
            client_id: id(7),
            sender_id: id(3),
            payload: Bytes::from_static(b"hi"),
        });
        let raw = response.to_raw();
        assert_eq!(raw.get(FieldTag::DeclaredLength), Some(&RawValue::Int(2)));

        assert_eq!(dispatcher.handle(&get_frame(7), now), Response::BufferEmpty { client_id: id(7) });
    }

    #[test]
    fn test_fifo() {
        let now = Instant::now();
        let dispatcher = associated(&[1, 2, 7], now);

        dispatcher.handle(&push_frame(1, 7, b"A"), now);
        dispatcher.handle(&push_frame(2, 7, b"B"), now);

        assert_eq!(dispatcher.handle(&get_frame(7), now), Response::GetResponse { client_id: id(7), sender_id: id(1), payload: Bytes::from_static(b"A") });
        assert_eq!(dispatcher.handle(&get_frame(7), now), Response::GetResponse { client_id: id(7), sender_id: id(2), payload: Bytes::from_static(b"B") });
    }

    #[test]
    fn test_buffer_full() {
        let now = Instant::now();
        let dispatcher = associated(&[3], now);

        for _ in 0..MAX_BUFFER_SIZE {
            assert_eq!(dispatcher.handle(&push_frame(3, 7, b"x"), now), Response::PushSuccess { client_id: id(3) });
        }
        assert_eq!(dispatcher.handle(&push_frame(3, 7, b"y"), now), Response::BufferFull { client_id: id(3) });
        assert_eq!(dispatcher.state.inboxes.pending(&id(7)), MAX_BUFFER_SIZE);

        // draining one makes room for one
        dispatcher.handle(&associate_frame(7), now);
        dispatcher.handle(&get_frame(7), now);
        assert_eq!(dispatcher.handle(&push_frame(3, 7, b"y"), now), Response::PushSuccess { client_id: id(3) });
        assert_eq!(dispatcher.handle(&push_frame(3, 7, b"z"), now), Response::BufferFull { client_id: id(3) });
    }

    #[test]
    fn test_push_to_unassociated_recipient() {
        let now = Instant::now();
        let dispatcher = associated(&[3], now);
        assert_eq!(dispatcher.handle(&push_frame(3, 99, b"hi"), now), Response::PushSuccess { client_id: id(3) });
        assert_eq!(dispatcher.state.inboxes.pending(&id(99)), 1);
    }

    #[rstest]
    #[case::too_short(5, b"abcd")]
    #[case::too_long(3, b"abcd")]
    #[case::exceeds_max(MAX_PAYLOAD_LEN as u64 + 1, b"abcd")]
    #[case::exceeds_max_matching(MAX_PAYLOAD_LEN as u64 + 1, &[0u8; MAX_PAYLOAD_LEN + 1])]
    fn test_invalid_length(#[case] declared_length: u64, #[case] payload: &[u8]) {
        let now = Instant::now();
        let dispatcher = associated(&[3], now);

        let frame = push_frame_with_length(3, 7, payload, declared_length as i64);
        assert_eq!(dispatcher.handle(&frame, now), Response::InvalidLength { client_id: id(3) });
        assert_eq!(dispatcher.state.inboxes.pending(&id(7)), 0);
    }

    #[test]
    fn test_max_payload_len_is_accepted() {
        let now = Instant::now();
        let dispatcher = associated(&[3], now);
        assert_eq!(dispatcher.handle(&push_frame(3, 7, &[1u8; MAX_PAYLOAD_LEN]), now), Response::PushSuccess { client_id: id(3) });
    }

    #[test]
    fn test_empty_payload() {
        let now = Instant::now();
        let dispatcher = associated(&[3, 7], now);
        assert_eq!(dispatcher.handle(&push_frame(3, 7, b""), now), Response::PushSuccess { client_id: id(3) });
        assert_eq!(dispatcher.handle(&get_frame(7), now), Response::GetResponse { client_id: id(7), sender_id: id(3), payload: Bytes::new() });
    }

    #[test]
    fn test_not_associated() {
        let now = Instant::now();
        let dispatcher = dispatcher();

        assert_eq!(dispatcher.handle(&push_frame(3, 7, b"hi"), now), Response::NotAssociated { frame_type: FrameType::Data, client_id: id(3) });
        assert_eq!(dispatcher.handle(&get_frame(3), now), Response::NotAssociated { frame_type: FrameType::Control, client_id: id(3) });
        assert_eq!(dispatcher.state.inboxes.num_inboxes(), 0);
    }

    #[test]
    fn test_association_expires() {
        let t0 = Instant::now();
        let dispatcher = associated(&[3], t0);

        assert_eq!(dispatcher.handle(&push_frame(3, 7, b"a"), t0 + TIMEOUT), Response::PushSuccess { client_id: id(3) });

        let expired = t0 + TIMEOUT + Duration::from_millis(1);
        assert_eq!(dispatcher.handle(&push_frame(3, 7, b"b"), expired), Response::NotAssociated { frame_type: FrameType::Data, client_id: id(3) });
        assert_eq!(dispatcher.handle(&get_frame(3), expired), Response::NotAssociated { frame_type: FrameType::Control, client_id: id(3) });

        dispatcher.handle(&associate_frame(3), expired);
        assert_eq!(dispatcher.handle(&push_frame(3, 7, b"b"), expired), Response::PushSuccess { client_id: id(3) });
    }

    #[test]
    fn test_not_associated_takes_precedence() {
        let now = Instant::now();
        let dispatcher = dispatcher();

        // both the length and the association are wrong
        let frame = push_frame_with_length(3, 7, b"abcd", 5);
        assert_eq!(dispatcher.handle(&frame, now), Response::NotAssociated { frame_type: FrameType::Data, client_id: id(3) });

        // structurally broken as well
        let mut frame = push_frame(3, 7, b"hi");
        frame.remove(FieldTag::Payload);
        assert_eq!(dispatcher.handle(&frame, now), Response::NotAssociated { frame_type: FrameType::Data, client_id: id(3) });
    }

    #[test]
    fn test_malformed_push_from_associated_client() {
        let now = Instant::now();
        let dispatcher = associated(&[3], now);

        let mut frame = push_frame(3, 7, b"hi");
        frame.remove(FieldTag::PeerId);
        assert_eq!(dispatcher.handle(&frame, now), Response::MalformedFrame { frame_type: FrameType::Data, client_id: Some(id(3)) });

        let frame = push_frame(3, 7, b"hi").with(FieldTag::DeclaredLength, "2");
        assert_eq!(dispatcher.handle(&frame, now), Response::MalformedFrame { frame_type: FrameType::Data, client_id: Some(id(3)) });
    }

    #[test]
    fn test_push_to_overlong_recipient_id() {
        let now = Instant::now();
        let dispatcher = associated(&[3], now);

        let frame = push_frame(3, 7, b"hi").with(FieldTag::PeerId, "r".repeat(MAX_CLIENT_ID_LEN + 1));
        assert_eq!(dispatcher.handle(&frame, now), Response::MalformedFrame { frame_type: FrameType::Data, client_id: Some(id(3)) });
        assert_eq!(dispatcher.state.inboxes.num_inboxes(), 0);
    }

    #[rstest]
    #[case::empty(RawFrame::new(), FrameType::Management, None)]
    #[case::associate_without_client_id(RawFrame::new().with(FieldTag::FrameType, 0).with(FieldTag::MessageCode, 1), FrameType::Management, None)]
    #[case::get_without_client_id(RawFrame::new().with(FieldTag::FrameType, 1).with(FieldTag::MessageCode, 2), FrameType::Control, None)]
    #[case::invalid_frame_type(RawFrame::new().with(FieldTag::FrameType, 9).with(FieldTag::MessageCode, 1).with(FieldTag::ClientId, 4), FrameType::Management, Some(id(4)))]
    fn test_malformed(#[case] raw: RawFrame, #[case] frame_type: FrameType, #[case] client_id: Option<ClientId>) {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.handle(&raw, Instant::now()), Response::MalformedFrame { frame_type, client_id });
        assert!(dispatcher.state.registry.is_empty());
    }

    #[rstest]
    #[case::push_as_management(0, 3, Some(id(3)))]
    #[case::get_as_data(2, 2, Some(id(3)))]
    #[case::response_code(0, 16, Some(id(3)))]
    #[case::unknown_code(1, 200, Some(id(3)))]
    #[case::without_client_id(2, 99, None)]
    fn test_unknown_message(#[case] frame_type: i64, #[case] message_code: i64, #[case] client_id: Option<ClientId>) {
        let dispatcher = associated(&[3], Instant::now());

        let mut raw = RawFrame::new()
            .with(FieldTag::FrameType, frame_type)
            .with(FieldTag::MessageCode, message_code);
        if client_id.is_some() {
            raw.set(FieldTag::ClientId, 3);
        }

        let expected_frame_type = FrameType::try_from(frame_type as u8).unwrap();
        assert_eq!(dispatcher.handle(&raw, Instant::now()), Response::UnknownMessage { frame_type: expected_frame_type, client_id });
    }

    #[test]
    fn test_get_on_empty_inbox_is_repeatable() {
        let now = Instant::now();
        let dispatcher = associated(&[7], now);

        for _ in 0..3 {
            assert_eq!(dispatcher.handle(&get_frame(7), now), Response::BufferEmpty { client_id: id(7) });
        }
        assert_eq!(dispatcher.state.inboxes.num_inboxes(), 0);
    }
}
