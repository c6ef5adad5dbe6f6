//! osh-test-utils: Test infrastructure for osh.
//!
//! Provides:
//! - MockConnection: In-memory connection handle with controllable lifetime
//! - RecordingSink: Channel sink that captures output, requests and closes
//! - mock_channel / session_pair: Channel-open and session doubles with a
//!   peer handle for driving input and requests

mod mock_transport;

pub use mock_transport::{
    ChannelPeer, MockConnection, OpenDecision, RecordingSink, SentRequest, mock_channel,
    mock_incoming, session_pair,
};
