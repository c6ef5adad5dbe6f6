//! Connection supervision.
//!
//! Each authenticated connection gets a supervisor that starts the global
//! request handler and the channel router side by side, waits for the
//! connection to end, and then closes it.

mod channels;
mod config;
mod global;

use tracing::{Instrument, debug, info, info_span, warn};

use osh_core::transport::IncomingConnection;

pub use channels::route_channels;
pub use config::ServerContext;
pub use global::handle_global_requests;

/// Serve one connection until it terminates.
pub async fn serve_connection(incoming: IncomingConnection, ctx: ServerContext) {
    let IncomingConnection {
        connection,
        global_requests,
        channels,
    } = incoming;
    let span = info_span!(
        "connection",
        peer = %connection.remote_addr(),
        user = %connection.user()
    );

    async move {
        info!(local = %connection.local_addr(), "connection established");

        tokio::spawn(handle_global_requests(global_requests).in_current_span());
        tokio::spawn(route_channels(channels, ctx).in_current_span());

        match connection.wait().await {
            Ok(()) => debug!("connection ended"),
            Err(e) if e.is_end_of_stream() => debug!("connection ended"),
            Err(e) => warn!(error = %e, "connection failed"),
        }

        if let Err(e) = connection.close().await {
            if !e.is_end_of_stream() {
                warn!(error = %e, "connection close failed");
            }
        }
        info!("connection closed");
    }
    .instrument(span)
    .await
}
