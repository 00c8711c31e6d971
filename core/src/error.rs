//! Error types for the tracking core.
//!
//! Argument and shape errors are programmer errors and are returned immediately.
//! Numerically degenerate geometry is not an error; it shows up as a wide (or
//! non-finite) covariance on the result instead.

use thiserror::Error;

/// Errors produced by the filter, the multilateration solver and the tracker.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackingError {
    /// An argument is outside its valid domain (e.g. `dt <= 0`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A vector or matrix does not have the shape the model declares.
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },

    /// Fewer anchors than the solver needs for a fix.
    #[error("insufficient anchors: {available} available, {required} required")]
    InsufficientAnchors { required: usize, available: usize },
}

impl TrackingError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        TrackingError::InvalidArgument(message.into())
    }

    pub(crate) fn shape(what: &'static str, expected: (usize, usize), found: (usize, usize)) -> Self {
        TrackingError::DimensionMismatch {
            what,
            expected: format!("{}x{}", expected.0, expected.1),
            found: format!("{}x{}", found.0, found.1),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrackingError>;
