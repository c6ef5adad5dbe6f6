//! Channel router.

use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, warn};

use osh_core::constants::{SESSION_CHANNEL, UNKNOWN_CHANNEL_MESSAGE};
use osh_core::error::Error;
use osh_core::protocol::RejectReason;
use osh_core::transport::NewChannel;

use super::ServerContext;
use crate::session::run_session;

/// Accept `session` channels and start a controller for each; reject every
/// other channel type. Returns when the channel-open stream closes.
///
/// Rejections carry [`RejectReason::UnknownChannelType`] and
/// [`UNKNOWN_CHANNEL_MESSAGE`]. The russh transport cannot put either on the
/// wire: clients see russh's fixed open-failure reason, and the adapter only
/// logs these.
pub async fn route_channels(mut channels: mpsc::Receiver<NewChannel>, ctx: ServerContext) {
    while let Some(new_channel) = channels.recv().await {
        let channel_type = new_channel.channel_type().to_string();

        if channel_type != SESSION_CHANNEL {
            let rejection = Error::ChannelRejected {
                channel_type: channel_type.clone(),
                message: UNKNOWN_CHANNEL_MESSAGE.to_string(),
            };
            info!(error = %rejection, "rejecting channel");
            if let Err(e) = new_channel
                .reject(RejectReason::UnknownChannelType, UNKNOWN_CHANNEL_MESSAGE)
                .await
            {
                warn!(channel_type = %channel_type, error = %e, "channel reject failed");
            }
            continue;
        }

        let channel = match new_channel.accept().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "unable to accept session channel");
                continue;
            }
        };
        debug!(channel = %channel.id, "session channel accepted");

        let ctx = ctx.clone();
        tokio::spawn(
            async move {
                run_session(channel, ctx).await;
            }
            .in_current_span(),
        );
    }
    debug!("channel-open stream closed");
}
