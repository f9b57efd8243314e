#![forbid(unsafe_code)]

//! Session orchestrator for automated job-application agents.
//!
//! Tracks a fleet of long-running application sessions: a durable
//! append-only timeline per session, live fan-out to subscribers, and a
//! cooperative pause/resume control protocol.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
