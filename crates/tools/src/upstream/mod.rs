//! Outbound HTTP plumbing shared by the tools.

pub mod client;
pub mod config;

pub use client::{endpoint, UpstreamClient};
pub use config::{RetryConfig, UpstreamConfig};
