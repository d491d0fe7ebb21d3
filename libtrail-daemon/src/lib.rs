//! libtrail daemon library.
//!
//! Exposes internal modules for integration testing.
//! In production, `libtrail-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
pub mod scheduler;
