//! Session orchestration modules.
//!
//! Covers the session state machine registry, the append-only timeline
//! with live fan-out, the pause/resume control plane, and the
//! stale-session sweep.

pub mod control;
pub mod hub;
pub mod locks;
pub mod registry;
pub mod sweeper;
pub mod timeline;
