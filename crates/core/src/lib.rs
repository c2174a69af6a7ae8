//! Pure telemetry logic for the printwatch poller.
//!
//! Nothing in this crate performs I/O. The control loop feeds it job
//! states and firmware log lines and executes the [`monitor::Effect`]s
//! it hands back.

pub mod error;
pub mod gate;
pub mod job;
pub mod monitor;
pub mod parser;
pub mod profile;
pub mod sample;
pub mod throttle;
pub mod ticket;
pub mod trigger;
pub mod types;
