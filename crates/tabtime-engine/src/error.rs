use tabtime_core::{SurfaceId, ValidationError};
use tabtime_db::DbError;
use thiserror::Error;

/// Failures reported by the host environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The surface no longer exists (closed, or never existed).
    #[error("surface {0} not found")]
    SurfaceNotFound(SurfaceId),
    /// The host could not answer the query.
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persisting state failed. The in-memory change stands.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
    #[error("host error: {0}")]
    Host(#[from] HostError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The host reported no active surface in the current window.
    #[error("no active tab")]
    NoActiveSurface,
}
