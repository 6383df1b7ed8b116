use bytes::Bytes;

use crate::frame::frame_model::{ClientId, FrameType, MessageCode};
use crate::frame::raw_frame::{FieldTag, RawFrame, RawValue};

fn client_value(client_id: impl Into<ClientId>) -> RawValue {
    match client_id.into() {
        ClientId::Num(n) => RawValue::Int(n),
        ClientId::Name(s) => RawValue::Str(s),
    }
}

fn request(frame_type: FrameType, message_code: MessageCode, client_id: impl Into<ClientId>) -> RawFrame {
    RawFrame::new()
        .with(FieldTag::FrameType, frame_type.wire_value())
        .with(FieldTag::MessageCode, message_code.wire_value())
        .with(FieldTag::ClientId, client_value(client_id))
}

pub fn associate_frame(client_id: impl Into<ClientId>) -> RawFrame {
    request(FrameType::Management, MessageCode::Associate, client_id)
}

pub fn get_frame(client_id: impl Into<ClientId>) -> RawFrame {
    request(FrameType::Control, MessageCode::Get, client_id)
}

/// a PUSH request with the payload's actual length as declared length
pub fn push_frame(sender_id: impl Into<ClientId>, recipient_id: impl Into<ClientId>, payload: &[u8]) -> RawFrame {
    push_frame_with_length(sender_id, recipient_id, payload, payload.len() as i64)
}

pub fn push_frame_with_length(sender_id: impl Into<ClientId>, recipient_id: impl Into<ClientId>, payload: &[u8], declared_length: i64) -> RawFrame {
    request(FrameType::Data, MessageCode::Push, sender_id)
        .with(FieldTag::PeerId, client_value(recipient_id))
        .with(FieldTag::Payload, Bytes::copy_from_slice(payload))
        .with(FieldTag::DeclaredLength, declared_length)
}
