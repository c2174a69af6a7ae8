//! OctoPrint push-socket frame types and parser.
//!
//! OctoPrint sends JSON objects with a single key naming the frame kind,
//! e.g. `{"current": {"logs": [...], ...}}`. Only `connected` and
//! `current` carry anything the poller uses; `history` replays old
//! responses on connect and is deliberately dropped.

use serde::Deserialize;

/// A decoded push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// Handshake acknowledgement sent right after connecting.
    Connected(ConnectedData),

    /// Periodic state update with new firmware log lines.
    Current(CurrentData),

    /// Backlog replayed on connect.
    History,

    /// `event`, `plugin`, `slicingProgress`, and anything else.
    Other(String),
}

/// Payload for `connected` frames.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConnectedData {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub display_version: Option<String>,
    #[serde(default)]
    pub safe_mode: Option<bool>,
}

/// Payload for `current` frames.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CurrentData {
    /// Raw terminal lines (`Send: ...`, `Recv: ...`) since the last frame.
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub state: Option<CurrentState>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CurrentState {
    #[serde(default)]
    pub text: String,
}

/// Parse a raw text frame into a [`PushMessage`].
pub fn parse_frame(text: &str) -> Result<PushMessage, serde_json::Error> {
    let frame: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
    let Some((kind, payload)) = frame.into_iter().next() else {
        return Ok(PushMessage::Other(String::new()));
    };

    Ok(match kind.as_str() {
        "connected" => PushMessage::Connected(serde_json::from_value(payload)?),
        "current" => PushMessage::Current(serde_json::from_value(payload)?),
        "history" => PushMessage::History,
        _ => PushMessage::Other(kind),
    })
}
