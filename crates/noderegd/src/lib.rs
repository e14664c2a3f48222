//! noderegd — startup wiring for the node-register daemon.
//!
//! The binary in `main.rs` only sets up logging and signals; turning
//! command-line flags into validated settings lives here so it can be
//! exercised without spawning the process.

pub mod config;
pub mod netif;

pub use config::{Cli, Settings};
