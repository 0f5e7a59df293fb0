//! Infrastructure - configuration and metrics
//!
//! - `config` - Application configuration (TOML loading, defaults, identity)
//! - `metrics` - Lock-free tick counters

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::Config;
pub use metrics::Metrics;
