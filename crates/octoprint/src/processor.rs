//! Push-socket frame processing loop.
//!
//! Reads frames from a [`PushSocket`], parses them with [`parse_frame`],
//! and forwards each firmware log line to the control loop as a
//! [`StreamEvent::LogLine`]. Nothing here touches telemetry state.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::PushSocket;
use crate::events::StreamEvent;
use crate::messages::{parse_frame, PushMessage};

/// Why [`process_frames`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLoopExit {
    /// The socket closed or failed; reconnecting is appropriate.
    Closed,
    /// Shutdown was requested; a close frame was sent.
    Cancelled,
    /// The control loop dropped its receiver.
    ReceiverDropped,
}

/// Process frames until the socket closes, `cancel` fires, or the
/// receiver goes away.
pub async fn process_frames(
    ws_stream: &mut PushSocket,
    event_tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> FrameLoopExit {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = ws_stream.close(None).await {
                    tracing::debug!(error = %e, "Push socket close failed");
                }
                return FrameLoopExit::Cancelled;
            }
            next = ws_stream.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if !handle_text_frame(&text, event_tx).await {
                    return FrameLoopExit::ReceiverDropped;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!("Ignoring binary push frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "Push socket closed by controller");
                return FrameLoopExit::Closed;
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "Push socket receive error");
                return FrameLoopExit::Closed;
            }
            None => return FrameLoopExit::Closed,
        }
    }
}

/// Handle one text frame. Returns `false` once the receiver is gone.
pub async fn handle_text_frame(text: &str, event_tx: &mpsc::Sender<StreamEvent>) -> bool {
    match parse_frame(text) {
        Ok(PushMessage::Connected(data)) => {
            tracing::info!(
                version = data.version.as_deref().unwrap_or("unknown"),
                "OctoPrint acknowledged push socket",
            );
        }
        Ok(PushMessage::Current(data)) => {
            for line in data.logs {
                if event_tx.send(StreamEvent::LogLine(line)).await.is_err() {
                    return false;
                }
            }
        }
        Ok(PushMessage::History) => {
            tracing::debug!("Ignoring history frame");
        }
        Ok(PushMessage::Other(kind)) => {
            tracing::trace!(kind = %kind, "Ignoring push frame");
        }
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse push frame");
        }
    }
    true
}
