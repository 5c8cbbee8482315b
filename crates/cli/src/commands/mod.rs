//! CLI Commands

pub mod claims;
pub mod config;
pub mod lock;
