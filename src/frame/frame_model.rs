use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::frame::raw_frame::{FieldTag, RawFrame, RawValue};

/// Maximum length of a string client id in bytes. Longer ids make a frame malformed.
pub const MAX_CLIENT_ID_LEN: usize = 255;

const MAX_INT_FIELD_LEN: usize = 2 + 10;
const MAX_CLIENT_ID_FIELD_LEN: usize = 2 + 2 + MAX_CLIENT_ID_LEN;

/// Upper bound for everything in an encoded response datagram except the payload bytes: status
///  byte, frame header, and all fields of a GET_RESPONSE (which has the most), with client ids at
///  their maximum length and the payload's length prefix for payloads of up to 2^21 bytes.
pub const MAX_RESPONSE_OVERHEAD: usize = 1
    + 1 + 8 + 1
    + 3 * MAX_INT_FIELD_LEN
    + 2 * MAX_CLIENT_ID_FIELD_LEN
    + 2 + 3;


#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Management = 0,
    Control = 1,
    Data = 2,
}
impl FrameType {
    pub fn wire_value(self) -> i64 {
        u8::from(self).into()
    }
}

/// All message codes, for requests and responses alike. A code's meaning depends on the frame
///  type it is combined with: only the combinations listed in [Request::parse] and
///  [Response::parse] are valid.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageCode {
    Associate = 1,
    Get = 2,
    Push = 3,

    AssociationSuccess = 16,
    PushSuccess = 17,
    GetResponse = 18,

    MalformedFrame = 32,
    NotAssociated = 33,
    InvalidLength = 34,
    BufferFull = 35,
    BufferEmpty = 36,
    UnknownMessage = 37,
}
impl MessageCode {
    pub fn wire_value(self) -> i64 {
        u8::from(self).into()
    }
}

/// A client's identity. It is an opaque token that is neither verified nor interpreted, and it
///  can be either numeric or a string on the wire.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ClientId {
    Num(i64),
    Name(String),
}
impl ClientId {
    fn to_raw(&self) -> RawValue {
        match self {
            ClientId::Num(n) => RawValue::Int(*n),
            ClientId::Name(s) => RawValue::Str(s.clone()),
        }
    }

    fn try_from_raw(value: &RawValue) -> Option<ClientId> {
        match value {
            RawValue::Int(n) => Some(ClientId::Num(*n)),
            RawValue::Str(s) => Some(ClientId::Name(s.clone())),
            RawValue::Bytes(_) => None,
        }
    }
}
impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientId::Num(n) => write!(f, "{}", n),
            ClientId::Name(s) => write!(f, "{:?}", s),
        }
    }
}
impl From<i64> for ClientId {
    fn from(value: i64) -> Self {
        ClientId::Num(value)
    }
}
impl From<i32> for ClientId {
    fn from(value: i32) -> Self {
        ClientId::Num(value.into())
    }
}
impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        ClientId::Name(value.to_string())
    }
}
/// Anything that parses as an integer is a numeric id, everything else a name
impl FromStr for ClientId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(n) => ClientId::Num(n),
            Err(_) => ClientId::Name(s.to_string()),
        })
    }
}


/// A frame that could not be interpreted for its (frame type, message code) combination. It
///  carries whatever parts of the envelope were recoverable so that the response can echo them.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("malformed frame ({frame_type:?}/{message_code:?}, client {client_id:?}): {reason}")]
pub struct MalformedFrame {
    pub frame_type: Option<FrameType>,
    pub message_code: Option<MessageCode>,
    pub client_id: Option<ClientId>,
    pub reason: String,
}

/// The envelope parts every frame has. Each one is parsed independently, so that a problem in one
///  of them does not prevent recovering the others.
struct Envelope {
    frame_type: Result<FrameType, String>,
    message_code: Result<i64, String>,
    client_id: Result<ClientId, String>,
}
impl Envelope {
    fn parse(raw: &RawFrame) -> Envelope {
        let frame_type = required_int(raw, FieldTag::FrameType)
            .and_then(|n| u8::try_from(n)
                .ok()
                .and_then(|n| FrameType::try_from(n).ok())
                .ok_or_else(|| format!("invalid frame type {}", n))
            );

        Envelope {
            frame_type,
            message_code: required_int(raw, FieldTag::MessageCode),
            client_id: required_client_id(raw, FieldTag::ClientId),
        }
    }

    fn known_message_code(&self) -> Option<MessageCode> {
        self.message_code.as_ref().ok()
            .and_then(|&n| u8::try_from(n).ok())
            .and_then(|n| MessageCode::try_from(n).ok())
    }

    fn malformed(&self, reason: String) -> MalformedFrame {
        MalformedFrame {
            frame_type: self.frame_type.as_ref().ok().copied(),
            message_code: self.known_message_code(),
            client_id: self.client_id.as_ref().ok().cloned(),
            reason,
        }
    }

    fn frame_type(&self) -> Result<FrameType, MalformedFrame> {
        self.frame_type.clone().map_err(|reason| self.malformed(reason))
    }

    fn message_code(&self) -> Result<i64, MalformedFrame> {
        self.message_code.clone().map_err(|reason| self.malformed(reason))
    }

    fn client_id(&self) -> Result<ClientId, MalformedFrame> {
        self.client_id.clone().map_err(|reason| self.malformed(reason))
    }
}

fn required<'a>(raw: &'a RawFrame, tag: FieldTag) -> Result<&'a RawValue, String> {
    raw.get(tag)
        .ok_or_else(|| format!("missing field {:?}", tag))
}

fn required_int(raw: &RawFrame, tag: FieldTag) -> Result<i64, String> {
    match required(raw, tag)? {
        RawValue::Int(n) => Ok(*n),
        other => Err(format!("field {:?} must be an integer, was {:?}", tag, other)),
    }
}

fn required_length(raw: &RawFrame, tag: FieldTag) -> Result<u64, String> {
    let n = required_int(raw, tag)?;
    u64::try_from(n)
        .map_err(|_| format!("field {:?} must not be negative, was {}", tag, n))
}

fn required_client_id(raw: &RawFrame, tag: FieldTag) -> Result<ClientId, String> {
    match required(raw, tag)? {
        RawValue::Str(s) if s.len() > MAX_CLIENT_ID_LEN => Err(format!("field {:?} is {} bytes long, exceeding the maximum of {}", tag, s.len(), MAX_CLIENT_ID_LEN)),
        value => ClientId::try_from_raw(value)
            .ok_or_else(|| format!("field {:?} must be an integer or a string, was {:?}", tag, value)),
    }
}

fn required_bytes(raw: &RawFrame, tag: FieldTag) -> Result<Bytes, String> {
    match required(raw, tag)? {
        RawValue::Bytes(b) => Ok(b.clone()),
        other => Err(format!("field {:?} must be a byte sequence, was {:?}", tag, other)),
    }
}


#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Request {
    Associate {
        client_id: ClientId,
    },
    Push {
        client_id: ClientId,
        recipient_id: ClientId,
        payload: Bytes,
        declared_length: u64,
    },
    Get {
        client_id: ClientId,
    },
    /// A combination of a valid frame type and a message code that is not a request
    Unknown {
        frame_type: FrameType,
        message_code: i64,
        client_id: Option<ClientId>,
    },
}
impl Request {
    /// Validates a decoded frame against the fields required for its frame type and message code:
    ///
    /// | frame type | message code | required fields                                          |
    /// |------------|--------------|----------------------------------------------------------|
    /// | MANAGEMENT | ASSOCIATE    | client_id                                                |
    /// | DATA       | PUSH         | client_id, peer_id, payload, declared_length             |
    /// | CONTROL    | GET          | client_id                                                |
    ///
    /// Any other message code with a valid frame type is an [Request::Unknown] request. This
    ///  performs no business checks: a declared length that does not match the payload is still
    ///  a well-formed frame.
    pub fn parse(raw: &RawFrame) -> Result<Request, MalformedFrame> {
        let envelope = Envelope::parse(raw);
        let frame_type = envelope.frame_type()?;
        let message_code = envelope.message_code()?;

        match (frame_type, envelope.known_message_code()) {
            (FrameType::Management, Some(MessageCode::Associate)) => Ok(Request::Associate {
                client_id: envelope.client_id()?,
            }),
            (FrameType::Data, Some(MessageCode::Push)) => {
                let client_id = envelope.client_id()?;
                let body = required_client_id(raw, FieldTag::PeerId)
                    .and_then(|recipient_id| Ok((
                        recipient_id,
                        required_bytes(raw, FieldTag::Payload)?,
                        required_length(raw, FieldTag::DeclaredLength)?,
                    )));
                let (recipient_id, payload, declared_length) = body
                    .map_err(|reason| envelope.malformed(reason))?;

                Ok(Request::Push {
                    client_id,
                    recipient_id,
                    payload,
                    declared_length,
                })
            }
            (FrameType::Control, Some(MessageCode::Get)) => Ok(Request::Get {
                client_id: envelope.client_id()?,
            }),
            _ => Ok(Request::Unknown {
                frame_type,
                message_code,
                client_id: envelope.client_id.ok(),
            }),
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Request::Associate { .. } => FrameType::Management,
            Request::Push { .. } => FrameType::Data,
            Request::Get { .. } => FrameType::Control,
            Request::Unknown { frame_type, .. } => *frame_type,
        }
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        match self {
            Request::Associate { client_id } => Some(client_id),
            Request::Push { client_id, .. } => Some(client_id),
            Request::Get { client_id } => Some(client_id),
            Request::Unknown { client_id, .. } => client_id.as_ref(),
        }
    }

    pub fn to_raw(&self) -> RawFrame {
        let (message_code, client_id) = match self {
            Request::Associate { client_id } => (MessageCode::Associate.wire_value(), Some(client_id)),
            Request::Push { client_id, .. } => (MessageCode::Push.wire_value(), Some(client_id)),
            Request::Get { client_id } => (MessageCode::Get.wire_value(), Some(client_id)),
            Request::Unknown { message_code, client_id, .. } => (*message_code, client_id.as_ref()),
        };

        let mut raw = RawFrame::new()
            .with(FieldTag::FrameType, self.frame_type().wire_value())
            .with(FieldTag::MessageCode, message_code);
        if let Some(client_id) = client_id {
            raw.set(FieldTag::ClientId, client_id.to_raw());
        }
        if let Request::Push { recipient_id, payload, declared_length, .. } = self {
            raw.set(FieldTag::PeerId, recipient_id.to_raw());
            raw.set(FieldTag::Payload, payload.clone());
            raw.set(FieldTag::DeclaredLength, *declared_length as i64);
        }
        raw
    }
}


#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Response {
    AssociationSuccess {
        client_id: ClientId,
    },
    PushSuccess {
        client_id: ClientId,
    },
    /// A message drained from the requester's inbox. Its declared length is always the payload's
    ///  length.
    GetResponse {
        client_id: ClientId,
        sender_id: ClientId,
        payload: Bytes,
    },
    MalformedFrame {
        frame_type: FrameType,
        client_id: Option<ClientId>,
    },
    NotAssociated {
        frame_type: FrameType,
        client_id: ClientId,
    },
    InvalidLength {
        client_id: ClientId,
    },
    BufferFull {
        client_id: ClientId,
    },
    BufferEmpty {
        client_id: ClientId,
    },
    UnknownMessage {
        frame_type: FrameType,
        client_id: Option<ClientId>,
    },
}
impl Response {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Response::AssociationSuccess { .. } => FrameType::Management,
            Response::PushSuccess { .. } => FrameType::Data,
            Response::GetResponse { .. } => FrameType::Data,
            Response::MalformedFrame { frame_type, .. } => *frame_type,
            Response::NotAssociated { frame_type, .. } => *frame_type,
            Response::InvalidLength { .. } => FrameType::Data,
            Response::BufferFull { .. } => FrameType::Data,
            Response::BufferEmpty { .. } => FrameType::Control,
            Response::UnknownMessage { frame_type, .. } => *frame_type,
        }
    }

    pub fn message_code(&self) -> MessageCode {
        match self {
            Response::AssociationSuccess { .. } => MessageCode::AssociationSuccess,
            Response::PushSuccess { .. } => MessageCode::PushSuccess,
            Response::GetResponse { .. } => MessageCode::GetResponse,
            Response::MalformedFrame { .. } => MessageCode::MalformedFrame,
            Response::NotAssociated { .. } => MessageCode::NotAssociated,
            Response::InvalidLength { .. } => MessageCode::InvalidLength,
            Response::BufferFull { .. } => MessageCode::BufferFull,
            Response::BufferEmpty { .. } => MessageCode::BufferEmpty,
            Response::UnknownMessage { .. } => MessageCode::UnknownMessage,
        }
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        match self {
            Response::AssociationSuccess { client_id } => Some(client_id),
            Response::PushSuccess { client_id } => Some(client_id),
            Response::GetResponse { client_id, .. } => Some(client_id),
            Response::MalformedFrame { client_id, .. } => client_id.as_ref(),
            Response::NotAssociated { client_id, .. } => Some(client_id),
            Response::InvalidLength { client_id } => Some(client_id),
            Response::BufferFull { client_id } => Some(client_id),
            Response::BufferEmpty { client_id } => Some(client_id),
            Response::UnknownMessage { client_id, .. } => client_id.as_ref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::AssociationSuccess { .. } | Response::PushSuccess { .. } | Response::GetResponse { .. })
    }

    pub fn to_raw(&self) -> RawFrame {
        let mut raw = RawFrame::new()
            .with(FieldTag::FrameType, self.frame_type().wire_value())
            .with(FieldTag::MessageCode, self.message_code().wire_value());
        if let Some(client_id) = self.client_id() {
            raw.set(FieldTag::ClientId, client_id.to_raw());
        }
        if let Response::GetResponse { sender_id, payload, .. } = self {
            raw.set(FieldTag::PeerId, sender_id.to_raw());
            raw.set(FieldTag::Payload, payload.clone());
            raw.set(FieldTag::DeclaredLength, payload.len() as i64);
        }
        raw
    }

    /// The client side counterpart of [Request::parse], with the same field typing rules.
    pub fn parse(raw: &RawFrame) -> Result<Response, MalformedFrame> {
        let envelope = Envelope::parse(raw);
        let frame_type = envelope.frame_type()?;
        envelope.message_code()?;

        let response = match envelope.known_message_code() {
            Some(MessageCode::AssociationSuccess) => Response::AssociationSuccess { client_id: envelope.client_id()? },
            Some(MessageCode::PushSuccess) => Response::PushSuccess { client_id: envelope.client_id()? },
            Some(MessageCode::GetResponse) => {
                let client_id = envelope.client_id()?;
                let body = required_client_id(raw, FieldTag::PeerId)
                    .and_then(|sender_id| Ok((
                        sender_id,
                        required_bytes(raw, FieldTag::Payload)?,
                        required_length(raw, FieldTag::DeclaredLength)?,
                    )));
                let (sender_id, payload, declared_length) = body
                    .map_err(|reason| envelope.malformed(reason))?;
                if declared_length != payload.len() as u64 {
                    return Err(envelope.malformed(format!("declared length {} does not match payload length {}", declared_length, payload.len())));
                }
                Response::GetResponse { client_id, sender_id, payload }
            }
            Some(MessageCode::MalformedFrame) => Response::MalformedFrame { frame_type, client_id: envelope.client_id.as_ref().ok().cloned() },
            Some(MessageCode::NotAssociated) => Response::NotAssociated { frame_type, client_id: envelope.client_id()? },
            Some(MessageCode::InvalidLength) => Response::InvalidLength { client_id: envelope.client_id()? },
            Some(MessageCode::BufferFull) => Response::BufferFull { client_id: envelope.client_id()? },
            Some(MessageCode::BufferEmpty) => Response::BufferEmpty { client_id: envelope.client_id()? },
            Some(MessageCode::UnknownMessage) => Response::UnknownMessage { frame_type, client_id: envelope.client_id.as_ref().ok().cloned() },
            _ => return Err(envelope.malformed("not a response message code".to_string())),
        };

        if response.frame_type() != frame_type {
            return Err(envelope.malformed(format!("{:?} is not valid for frame type {:?}", response.message_code(), frame_type)));
        }
        Ok(response)
    }
}
