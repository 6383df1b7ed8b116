use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::Crc;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::util::buf::{put_i64_varint, put_len_prefixed, put_string, try_get_i64_varint, try_get_len_prefixed, try_get_string};

pub const PROTOCOL_VERSION: u8 = 1;

const CHECKSUM_OFFSET: usize = 1;
const FIELDS_OFFSET: usize = CHECKSUM_OFFSET + size_of::<u64>();

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Checksum(pub u64);
impl Debug for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x?}", self.0)
    }
}
impl Checksum {
    pub fn new(data: &[u8]) -> Checksum {
        let hasher = Crc::<u64>::new(&crc::CRC_64_REDIS);
        let mut digest = hasher.digest();
        digest.update(data);
        Checksum(digest.finalize())
    }
}

/// Identifies a field inside an encoded frame. Each tag may occur at most once per frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FieldTag {
    FrameType = 1,
    MessageCode = 2,
    ClientId = 3,
    PeerId = 4,
    Payload = 5,
    DeclaredLength = 6,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
enum ValueKind {
    Int = 0,
    Str = 1,
    Bytes = 2,
}

/// A decoded but not yet validated field value. The frame model decides whether a value has the
///  right semantic type for the field it is stored in.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RawValue {
    Int(i64),
    Str(String),
    Bytes(Bytes),
}
impl RawValue {
    fn kind(&self) -> ValueKind {
        match self {
            RawValue::Int(_) => ValueKind::Int,
            RawValue::Str(_) => ValueKind::Str,
            RawValue::Bytes(_) => ValueKind::Bytes,
        }
    }

    fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.kind().into());
        match self {
            RawValue::Int(v) => put_i64_varint(buf, *v),
            RawValue::Str(s) => put_string(buf, s),
            RawValue::Bytes(b) => put_len_prefixed(buf, b),
        }
    }

    fn try_deser(buf: &mut impl Buf) -> anyhow::Result<RawValue> {
        let value = match ValueKind::try_from(buf.try_get_u8()?)? {
            ValueKind::Int => RawValue::Int(try_get_i64_varint(buf)?),
            ValueKind::Str => RawValue::Str(try_get_string(buf)?),
            ValueKind::Bytes => RawValue::Bytes(try_get_len_prefixed(buf)?),
        };
        Ok(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}
impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Int(value.into())
    }
}
impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Str(value.to_string())
    }
}
impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Str(value)
    }
}
impl From<Bytes> for RawValue {
    fn from(value: Bytes) -> Self {
        RawValue::Bytes(value)
    }
}

/// The envelope as it travels on the wire: a set of tagged, self-describing fields.
///
/// Encoding (all fixed-width numbers in network byte order):
/// ```ascii
///  0: protocol version (u8)
///  1: checksum (u64) - CRC-64 over everything after the checksum
///  9: number of fields (u8)
///  *: (repeated) field tag (u8), value kind (u8), value
///       int:          zig-zag varint
///       string/bytes: varint length, raw bytes
/// ```
///
/// Decoding only checks that the datagram is a well-formed sequence of fields. Whether the fields
///  make sense for the frame's type and message code is the frame model's business.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RawFrame {
    fields: BTreeMap<FieldTag, RawValue>,
}
impl RawFrame {
    pub fn new() -> RawFrame {
        Default::default()
    }

    pub fn with(mut self, tag: FieldTag, value: impl Into<RawValue>) -> RawFrame {
        self.set(tag, value);
        self
    }

    pub fn set(&mut self, tag: FieldTag, value: impl Into<RawValue>) {
        self.fields.insert(tag, value.into());
    }

    pub fn remove(&mut self, tag: FieldTag) -> Option<RawValue> {
        self.fields.remove(&tag)
    }

    pub fn get(&self, tag: FieldTag) -> Option<&RawValue> {
        self.fields.get(&tag)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        let start = buf.len();

        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u64(0); // patched below
        buf.put_u8(self.fields.len() as u8);
        for (tag, value) in &self.fields {
            buf.put_u8((*tag).into());
            value.ser(buf);
        }

        let checksum = Checksum::new(&buf[start + FIELDS_OFFSET..]);
        buf[start + CHECKSUM_OFFSET..start + FIELDS_OFFSET].copy_from_slice(&checksum.0.to_be_bytes());
    }

    /// Decodes a complete datagram. Trailing bytes are an error.
    pub fn try_deser(mut buf: &[u8]) -> anyhow::Result<RawFrame> {
        let version = buf.try_get_u8()?;
        if version != PROTOCOL_VERSION {
            bail!("unsupported protocol version {}", version);
        }

        let checksum = Checksum(buf.try_get_u64()?);
        let actual_checksum = Checksum::new(buf);
        if checksum != actual_checksum {
            bail!("checksum error: frame has {:?}, calculated {:?}", checksum, actual_checksum);
        }

        let num_fields = buf.try_get_u8()?;
        let mut fields = BTreeMap::new();
        for _ in 0..num_fields {
            let tag = FieldTag::try_from(buf.try_get_u8()?)?;
            let value = RawValue::try_deser(&mut buf)?;
            if fields.insert(tag, value).is_some() {
                bail!("duplicate field {:?}", tag);
            }
        }

        if buf.has_remaining() {
            bail!("{} trailing bytes after last field", buf.remaining());
        }

        Ok(RawFrame { fields })
    }
}
