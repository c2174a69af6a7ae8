//! Events forwarded from the push-socket task to the control loop.

/// What the stream task reports over its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The push socket was (re)opened and the auth frame sent.
    Connected,

    /// The push socket closed; a reconnect follows after the delay.
    Disconnected,

    /// One firmware log line from a `current` frame, in arrival order.
    LogLine(String),
}
