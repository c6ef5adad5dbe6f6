//! Property-based tests for the payload codec.
//!
//! These tests use proptest to verify:
//! - Readers never panic on arbitrary input
//! - Short payloads are rejected
//! - Typed payloads survive encoding

#![cfg(test)]

use bytes::BytesMut;
use proptest::prelude::*;

use crate::error::Error;
use crate::protocol::{
    ExecRequest, PtyRequest, U32_LEN, WindowChange, put_string, put_u32, read_string, read_u32,
};

// =============================================================================
// Arbitrary Generators
// =============================================================================

prop_compose! {
    fn arb_pty_request()(
        term in "[a-z0-9-]{0,16}",
        cols in any::<u32>(),
        rows in any::<u32>(),
        pixel_width in any::<u32>(),
        pixel_height in any::<u32>(),
        modes in proptest::collection::vec(any::<u8>(), 0..32),
    ) -> PtyRequest {
        PtyRequest {
            term,
            cols,
            rows,
            pixel_width,
            pixel_height,
            modes: modes.into(),
        }
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn read_u32_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..16)) {
        let _ = read_u32(&payload);
    }

    #[test]
    fn read_string_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = read_string(&payload);
    }

    #[test]
    fn read_u32_short_payload_is_decode_error(
        payload in proptest::collection::vec(any::<u8>(), 0..U32_LEN)
    ) {
        let is_decode = matches!(read_u32(&payload), Err(Error::Decode { .. }));
        prop_assert!(is_decode, "short payload of {} bytes must be a decode error", payload.len());
    }

    #[test]
    fn read_u32_consumes_exactly_four_bytes(
        value in any::<u32>(),
        tail in proptest::collection::vec(any::<u8>(), 0..8),
    ) {
        let mut buf = BytesMut::new();
        put_u32(&mut buf, value);
        buf.extend_from_slice(&tail);

        let (decoded, rest) = read_u32(&buf).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(rest, &tail[..]);
    }

    #[test]
    fn read_string_rejects_overlong_length(
        body in proptest::collection::vec(any::<u8>(), 0..32),
        extra in 1u32..1024,
    ) {
        let mut buf = BytesMut::new();
        put_u32(&mut buf, body.len() as u32 + extra);
        buf.extend_from_slice(&body);
        let is_decode = matches!(read_string(&buf), Err(Error::Decode { .. }));
        prop_assert!(is_decode, "declared length past the payload must be a decode error");
    }

    #[test]
    fn read_string_consumes_prefix_and_body(
        value in "\\PC{0,32}",
        tail in proptest::collection::vec(any::<u8>(), 0..8),
    ) {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &value);
        buf.extend_from_slice(&tail);

        let (decoded, rest) = read_string(&buf).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(rest, &tail[..]);
    }

    #[test]
    fn pty_request_survives_encoding(req in arb_pty_request()) {
        let decoded = PtyRequest::decode(&req.to_payload()).unwrap();
        prop_assert_eq!(decoded, req);
    }

    #[test]
    fn exec_request_survives_encoding(command in "\\PC{0,64}") {
        let req = ExecRequest { command };
        prop_assert_eq!(ExecRequest::decode(&req.to_payload()).unwrap(), req);
    }

    #[test]
    fn truncated_window_change_fails(cut in 0usize..16) {
        let payload = WindowChange { cols: 80, rows: 24, pixel_width: 0, pixel_height: 0 }
            .to_payload();
        prop_assert!(WindowChange::decode(&payload[..cut]).is_err());
    }
}
