//! `CheapShark` lookup client for the Steam mapping pipeline.

pub mod client;
pub mod error;
pub mod rate_limit;
pub mod types;

pub use client::{CheapsharkClient, DEFAULT_BASE_URL};
pub use error::CheapsharkError;
pub use rate_limit::RateLimiter;
pub use types::{GameDetails, GameSearchEntry};
