//! CLI command implementations

pub mod config;
pub mod resources;
pub mod session;
