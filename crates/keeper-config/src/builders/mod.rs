//! Builders for test and development configurations.

mod config;

pub use config::ConfigBuilder;
