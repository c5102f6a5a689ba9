//! OSC scene router
//!
//! Compiles a YAML scene file into a command table, listens for
//! `/scene/<key>` and `/midi-scene/<fraction>` triggers over UDP and fans
//! each one out into an ordered, optionally delayed, burst of OSC commands
//! to the configured endpoints.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod drivers;
pub mod endpoints;
pub mod error;
pub mod listener;
pub mod router;
pub mod scene;
pub mod value;
