//! OctoPrint REST and push-socket client.
//!
//! Provides the REST wrapper used for login, job polling and command
//! dispatch, a bounded retry helper, the authenticated WebSocket client,
//! push-frame parsing, and the long-lived stream task that forwards
//! firmware log lines to the control loop.

pub mod api;
pub mod client;
pub mod events;
pub mod messages;
pub mod processor;
pub mod reconnect;
pub mod retry;
pub mod session;
pub mod stream;
