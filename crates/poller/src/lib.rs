//! Printer telemetry poller.
//!
//! Loads configuration from the environment, sets up logging, and runs
//! the control loop that drives a [`printwatch_core::monitor::Monitor`]
//! from OctoPrint job polls and push-socket log lines, appending
//! eligible samples to CSV and calling the prediction services.

pub mod config;
pub mod logging;
pub mod prediction;
pub mod runner;
pub mod store;
