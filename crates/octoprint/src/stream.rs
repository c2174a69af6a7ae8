//! The long-lived push-socket task.
//!
//! [`spawn_stream`] connects, forwards log lines over a bounded channel,
//! and reconnects after every close until cancelled. The control loop
//! is the only consumer.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::StreamClient;
use crate::events::StreamEvent;
use crate::processor::{process_frames, FrameLoopExit};
use crate::reconnect::{connect_with_retry, ReconnectPolicy};

/// Bound on log lines buffered between the socket and the control loop.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Start the stream task. Dropping the receiver or cancelling `cancel`
/// stops it.
pub fn spawn_stream(
    client: StreamClient,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
) -> (mpsc::Receiver<StreamEvent>, JoinHandle<()>) {
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let handle = tokio::spawn(run_stream(client, policy, event_tx, cancel));
    (event_rx, handle)
}

async fn run_stream(
    client: StreamClient,
    policy: ReconnectPolicy,
    event_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    loop {
        let Some(mut socket) = connect_with_retry(&client, &policy, &cancel).await else {
            return;
        };
        if event_tx.send(StreamEvent::Connected).await.is_err() {
            return;
        }

        match process_frames(&mut socket, &event_tx, &cancel).await {
            FrameLoopExit::Closed => {}
            FrameLoopExit::Cancelled | FrameLoopExit::ReceiverDropped => return,
        }

        if event_tx.send(StreamEvent::Disconnected).await.is_err() {
            return;
        }
        tracing::warn!(
            retry_in_secs = policy.delay.as_secs(),
            "Push socket lost, reconnecting",
        );
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}
