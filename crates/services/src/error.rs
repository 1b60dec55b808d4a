//! Shared error types for the services crate.

use thiserror::Error;

use skillpath_core::model::{PerformanceError, ProgressError};
use storage::repository::StorageError;

/// Locale-neutral failure class handed to callers for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Invalid,
    NotFound,
    Unavailable,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Invalid => "invalid",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Unavailable => "unavailable",
        }
    }
}

fn storage_category(err: &StorageError) -> ErrorCategory {
    match err {
        StorageError::NotFound => ErrorCategory::NotFound,
        _ => ErrorCategory::Unavailable,
    }
}

/// Errors emitted by `ProgressCoordinator`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoordinatorError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Performance(#[from] PerformanceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CoordinatorError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoordinatorError::Progress(_) | CoordinatorError::Performance(_) => {
                ErrorCategory::Invalid
            }
            CoordinatorError::Storage(err) => storage_category(err),
        }
    }
}

/// Errors emitted by `RecommendationService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecommendationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RecommendationError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RecommendationError::Storage(err) => storage_category(err),
        }
    }
}
