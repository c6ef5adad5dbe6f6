//! Payload codec for SSH control messages.
//!
//! Format: big-endian `uint32` fields and `string` fields made of a 4-byte
//! big-endian length prefix followed by that many bytes.
//!
//! Readers never panic: a payload that is too short for the requested field
//! yields [`Error::Decode`]. Each reader returns the decoded value together
//! with the unread remainder so fields can be chained.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// Width of a `uint32` field and of a string length prefix.
pub const U32_LEN: usize = 4;

/// Read a big-endian `uint32` from the front of `payload`.
pub fn read_u32(payload: &[u8]) -> Result<(u32, &[u8])> {
    if payload.len() < U32_LEN {
        return Err(Error::decode(format!(
            "payload too small to read uint32 ({} < {})",
            payload.len(),
            U32_LEN
        )));
    }
    let (head, rest) = payload.split_at(U32_LEN);
    let value = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    Ok((value, rest))
}

/// Read a length-prefixed byte string from the front of `payload`.
pub fn read_bytes(payload: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = read_u32(payload)?;
    let len = usize::try_from(len).map_err(|_| {
        Error::decode(format!("string length {} does not fit in memory", len))
    })?;
    if rest.len() < len {
        return Err(Error::decode(format!(
            "payload too small to read string ({} < {})",
            rest.len(),
            len
        )));
    }
    Ok(rest.split_at(len))
}

/// Read a length-prefixed string from the front of `payload`.
///
/// Invalid UTF-8 is replaced rather than rejected; terminal names and
/// command lines are only ever displayed or tokenized.
pub fn read_string(payload: &[u8]) -> Result<(String, &[u8])> {
    let (bytes, rest) = read_bytes(payload)?;
    Ok((String::from_utf8_lossy(bytes).into_owned(), rest))
}

/// Append a big-endian `uint32`.
pub fn put_u32(buf: &mut BytesMut, value: u32) {
    buf.put_u32(value);
}

/// Append a length-prefixed string.
///
/// # Panics
///
/// Panics if `value` is longer than `u32::MAX` bytes, which no control
/// message can carry.
pub fn put_string(buf: &mut BytesMut, value: impl AsRef<[u8]>) {
    let value = value.as_ref();
    let len = u32::try_from(value.len()).expect("string field longer than u32::MAX");
    buf.reserve(U32_LEN + value.len());
    buf.put_u32(len);
    buf.put_slice(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_u32_big_endian() {
        let (value, rest) = read_u32(&[0x00, 0x00, 0x01, 0x02, 0xff]).unwrap();
        assert_eq!(value, 258);
        assert_eq!(rest, &[0xff]);
    }

    #[test]
    fn read_u32_exact_length_leaves_empty_rest() {
        let (value, rest) = read_u32(&[0, 0, 0, 80]).unwrap();
        assert_eq!(value, 80);
        assert!(rest.is_empty());
    }

    #[test]
    fn read_u32_short_payloads_fail() {
        for len in 0..U32_LEN {
            let payload = vec![0xAB; len];
            let err = read_u32(&payload).unwrap_err();
            assert!(matches!(err, Error::Decode { .. }), "len {len}: {err}");
        }
    }

    #[test]
    fn read_string_with_remainder() {
        let payload = [0, 0, 0, 5, b'x', b't', b'e', b'r', b'm', 0, 0, 0, 80];
        let (term, rest) = read_string(&payload).unwrap();
        assert_eq!(term, "xterm");
        assert_eq!(rest, &[0, 0, 0, 80]);
    }

    #[test]
    fn read_string_empty() {
        let (value, rest) = read_string(&[0, 0, 0, 0]).unwrap();
        assert_eq!(value, "");
        assert!(rest.is_empty());
    }

    #[test]
    fn read_string_declared_length_exceeds_payload() {
        let payload = [0, 0, 0, 10, b'a', b'b'];
        let err = read_string(&payload).unwrap_err();
        assert_eq!(
            err.to_string(),
            "decode error: payload too small to read string (2 < 10)"
        );
    }

    #[test]
    fn read_string_missing_length_prefix() {
        assert!(matches!(read_string(&[0, 0]), Err(Error::Decode { .. })));
    }

    #[test]
    fn read_string_replaces_invalid_utf8() {
        let (value, _) = read_string(&[0, 0, 0, 2, 0xff, b'a']).unwrap();
        assert_eq!(value, "\u{fffd}a");
    }

    #[test]
    fn writers_produce_wire_layout() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "ls");
        put_u32(&mut buf, 7);
        assert_eq!(&buf[..], &[0, 0, 0, 2, b'l', b's', 0, 0, 0, 7]);
    }

    #[test]
    fn chained_reads_walk_fields() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "vt100");
        put_u32(&mut buf, 132);
        put_u32(&mut buf, 43);

        let (term, rest) = read_string(&buf).unwrap();
        let (cols, rest) = read_u32(rest).unwrap();
        let (rows, rest) = read_u32(rest).unwrap();
        assert_eq!((term.as_str(), cols, rows), ("vt100", 132, 43));
        assert!(rest.is_empty());
    }
}
