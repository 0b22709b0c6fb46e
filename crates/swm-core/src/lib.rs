pub mod app_config;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod ids;
pub mod lookup;
pub mod status;

pub use app_config::{AppConfig, Environment};
pub use batch::BatchResult;
pub use catalog::{is_recent_release, parse_release_date, AppCatalog, CatalogError};
pub use config::{load_app_config, load_app_config_from_env};
pub use ids::AppId;
pub use lookup::{ApiFailure, LookupOutcome, MappingDetails, MappingLookup};
pub use status::{JobStatus, MappingStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid Steam app id {0:?}: expected a non-empty decimal number")]
    InvalidAppId(String),

    #[error("unknown mapping status: {0}")]
    UnknownMappingStatus(String),

    #[error("unknown job status: {0}")]
    UnknownJobStatus(String),
}
