//! Reconnection logic for the push socket.
//!
//! The controller may be unreachable for long stretches during a
//! multi-hour print, so [`connect_with_retry`] never gives up on its own;
//! only the [`CancellationToken`] stops it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{PushSocket, StreamClient};

/// Wait between push-socket connection attempts, and after a
/// connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(10))
    }
}

/// Connect to the push socket, retrying until it succeeds.
///
/// Returns `None` if `cancel` fires first.
pub async fn connect_with_retry(
    client: &StreamClient,
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
) -> Option<PushSocket> {
    for attempt in 1u32.. {
        tracing::debug!(url = client.ws_url(), attempt, "Connecting to push socket");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = client.connect() => Some(result),
        };
        match outcome {
            None => {
                tracing::info!("Push socket connect cancelled");
                return None;
            }
            Some(Ok(socket)) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Push socket reconnected");
                }
                return Some(socket);
            }
            Some(Err(e)) => tracing::warn!(
                error = %e,
                attempt,
                retry_in_secs = policy.delay.as_secs(),
                "Push socket connect failed",
            ),
        }

        if tokio::time::timeout(policy.delay, cancel.cancelled()).await.is_ok() {
            return None;
        }
    }
    None
}
