use swm_core::{CatalogError, CoreError};
use swm_db::DbError;
use thiserror::Error;

/// Errors raised while driving the mapping pipeline.
///
/// Lookup failures are not errors here; they travel as
/// [`swm_core::LookupOutcome::ApiError`] and end up recorded against the app.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("scheduler is already running")]
    AlreadyRunning,
}

impl MapperError {
    /// Returns `true` if running the same operation again later may succeed.
    ///
    /// Database I/O and catalog reads are transient; decoding, invalid input
    /// and state-machine violations are not.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            MapperError::Db(DbError::Sqlx(_)) | MapperError::Catalog(_) => true,
            MapperError::Db(_) | MapperError::Core(_) | MapperError::AlreadyRunning => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_retriable() {
        let err = MapperError::from(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        assert!(err.is_retriable());
    }

    #[test]
    fn catalog_errors_are_retriable() {
        let err = MapperError::from(CatalogError {
            app_id: "10".to_string(),
            reason: "database is locked".to_string(),
        });
        assert!(err.is_retriable());
    }

    #[test]
    fn state_and_input_errors_are_not_retriable() {
        let transition = MapperError::from(DbError::InvalidJobTransition {
            id: 7,
            expected_status: "processing",
        });
        let invalid = MapperError::from(CoreError::InvalidAppId("abc".to_string()));

        assert!(!transition.is_retriable());
        assert!(!invalid.is_retriable());
        assert!(!MapperError::AlreadyRunning.is_retriable());
    }
}
