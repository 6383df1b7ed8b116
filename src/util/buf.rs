use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, Bytes};
use bytes_varint::{VarIntResult, VarIntSupport, VarIntSupportMut};


//TODO convenience for serializing / deserializing collections

pub fn put_string(buf: &mut impl BufMut, s: &str) {
    put_len_prefixed(buf, s.as_bytes());
}

pub fn try_get_string(buf: &mut impl Buf) -> anyhow::Result<String> {
    let raw = try_get_len_prefixed(buf)?;
    let s = String::from_utf8(raw.to_vec())?;
    Ok(s)
}

pub fn put_len_prefixed(buf: &mut impl BufMut, data: &[u8]) {
    buf.put_u64_varint(data.len() as u64);
    buf.put_slice(data);
}

/// Reads a varint length followed by that many bytes. The length is checked against the
///  remaining buffer before anything is copied, so a corrupt length fails instead of panicking.
pub fn try_get_len_prefixed(buf: &mut impl Buf) -> anyhow::Result<Bytes> {
    let len = buf.try_get_u64_varint().into_anyhow()?;
    if len > buf.remaining() as u64 {
        bail!("length prefix {} exceeds remaining buffer of {} bytes", len, buf.remaining());
    }
    Ok(buf.copy_to_bytes(len as usize))
}

pub fn put_i64_varint(buf: &mut impl BufMut, value: i64) {
    buf.put_i64_varint(value);
}

pub fn try_get_i64_varint(buf: &mut impl Buf) -> anyhow::Result<i64> {
    buf.try_get_i64_varint().into_anyhow()
}


pub trait VarIntErrorAdapter<T> {
    fn into_anyhow(self) -> anyhow::Result<T>;
}
impl <T> VarIntErrorAdapter<T> for VarIntResult<T> {
    fn into_anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow!("VarInt error: {:?}", e))
    }
}


#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::empty("")]
    #[case::ascii("hello")]
    #[case::multibyte("grüße")]
    fn test_string(#[case] s: &str) {
        let mut buf = BytesMut::new();
        put_string(&mut buf, s);
        buf.put_u8(99);

        let mut read_buf: &[u8] = &buf;
        assert_eq!(try_get_string(&mut read_buf).unwrap(), s);
        assert_eq!(read_buf, &[99]);
    }

    #[rstest]
    #[case::length_too_big(b"\x05abc")]
    #[case::no_length(b"")]
    fn test_len_prefixed_underflow(#[case] mut buf: &[u8]) {
        assert!(try_get_len_prefixed(&mut buf).is_err());
    }

    #[test]
    fn test_string_invalid_utf8() {
        let mut buf: &[u8] = b"\x02\xff\xfe";
        assert!(try_get_string(&mut buf).is_err());
    }

    #[rstest]
    #[case(0)]
    #[case(-1)]
    #[case(7)]
    #[case(i64::MAX)]
    #[case(i64::MIN)]
    fn test_i64_varint(#[case] value: i64) {
        let mut buf = BytesMut::new();
        put_i64_varint(&mut buf, value);
        let mut read_buf: &[u8] = &buf;
        assert_eq!(try_get_i64_varint(&mut read_buf).unwrap(), value);
        assert!(read_buf.is_empty());
    }
}
