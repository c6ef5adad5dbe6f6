//! Connection-level request handler.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use osh_core::protocol::RequestKind;
use osh_core::transport::Request;

/// Decline every global request. Returns when the request stream closes.
///
/// `no-more-sessions@openssh.com` is answered false too: the server never
/// restricts further sessions on the client's behalf.
pub async fn handle_global_requests(mut requests: mpsc::Receiver<Request>) {
    while let Some(mut req) = requests.recv().await {
        match req.request_kind() {
            RequestKind::NoMoreSessions => {
                debug!(want_reply = req.want_reply(), "no-more-sessions hint ignored");
            }
            kind => {
                debug!(
                    request = %kind,
                    want_reply = req.want_reply(),
                    payload_len = req.payload().len(),
                    "unhandled global request"
                );
            }
        }
        req.reply(false, Bytes::new());
    }
    debug!("global request stream closed");
}
