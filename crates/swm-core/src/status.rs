//! Status enums for mapping records and queue jobs.
//!
//! Both are persisted as lowercase snake-case text; `as_str` and `FromStr`
//! are the only conversions the storage layer uses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Lifecycle state of a Steam → `CheapShark` mapping.
///
/// `Unknown` is what callers see for an app that has never been attempted;
/// it is never written to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Unknown,
    Found,
    NotFound,
    TooNew,
    Failed,
}

impl MappingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MappingStatus::Unknown => "unknown",
            MappingStatus::Found => "found",
            MappingStatus::NotFound => "not_found",
            MappingStatus::TooNew => "too_new",
            MappingStatus::Failed => "failed",
        }
    }

    /// `true` for the two negative classifications that set `no_mapping_found`.
    #[must_use]
    pub fn is_no_mapping(self) -> bool {
        matches!(self, MappingStatus::NotFound | MappingStatus::TooNew)
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(MappingStatus::Unknown),
            "found" => Ok(MappingStatus::Found),
            "not_found" => Ok(MappingStatus::NotFound),
            "too_new" => Ok(MappingStatus::TooNew),
            "failed" => Ok(MappingStatus::Failed),
            other => Err(CoreError::UnknownMappingStatus(other.to_string())),
        }
    }
}

/// Lifecycle state of a mapping queue job.
///
/// `Pending → Processing → Completed | Failed`. Both terminal states are kept
/// for audit until the retention cleanup removes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(CoreError::UnknownJobStatus(other.to_string())),
        }
    }
}
