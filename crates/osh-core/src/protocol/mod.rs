//! Protocol module for osh control messages.
//!
//! This module provides:
//! - The big-endian payload codec
//! - Typed request payloads and request kinds
//! - Channel-open rejection reasons

pub mod codec;
mod types;

#[cfg(test)]
mod proptest;

pub use codec::{U32_LEN, put_string, put_u32, read_bytes, read_string, read_u32};
pub use types::*;
