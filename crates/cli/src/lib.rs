//! fixclaim CLI
//!
//! Command-line interface for inspecting and repairing a fixclaim
//! registry: claims, leaked claims, the registry lock and configuration.

pub mod client;
pub mod commands;
pub mod output;
