//! CLI command implementations.

pub mod demo;
pub mod relay;
pub mod send;
pub mod show_config;
