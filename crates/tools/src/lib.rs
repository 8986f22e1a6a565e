// Concrete tools: weather, recipes, grocery stores and grocery products

pub mod grocery;
pub mod kroger;
pub mod recipes;
pub mod upstream;
pub mod weather;

pub use grocery::BrandFilter;
pub use kroger::ClientCredentials;
pub use upstream::{RetryConfig, UpstreamClient, UpstreamConfig};
