//! osh-core: Shared library for the osh remote command shell.
//!
//! This crate provides:
//! - Control-message payload codec (SSH wire encoding)
//! - Typed channel and global request definitions
//! - Transport abstractions over an already-authenticated connection
//! - Error type and logging setup

pub mod constants;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod transport;

pub use error::{Error, Result};
pub use logging::{LogFormat, init_logging};
