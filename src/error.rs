//! Errors returned by the tracing SDK.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` for trace SDK operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// The result of an exporter handing a batch to its backend.
pub type ExportResult = TraceResult<()>;

/// Errors surfaced by span processors, exporters and the tracer provider.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// An exporter failed to deliver a batch.
    ///
    /// `retryable` tells whether resubmitting the same batch could succeed.
    /// The SDK itself never retries; the flag is reported so callers and
    /// diagnostics can tell transient failures from permanent ones.
    #[error("export failed: {reason} (retryable: {retryable})")]
    ExportFailed {
        /// Why the export failed.
        reason: String,
        /// Whether resubmitting the batch could succeed.
        retryable: bool,
    },

    /// The operation did not complete within the allotted time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The component was asked to do work after it was shut down.
    #[error("already shutdown")]
    AlreadyShutdown,

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl TraceError {
    /// Shorthand for a non-retryable export failure.
    pub fn export_failed(reason: impl Into<String>) -> Self {
        TraceError::ExportFailed {
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Shorthand for a retryable export failure.
    pub fn export_failed_retryable(reason: impl Into<String>) -> Self {
        TraceError::ExportFailed {
            reason: reason.into(),
            retryable: true,
        }
    }

    /// Whether retrying the failed operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TraceError::ExportFailed {
                retryable: true,
                ..
            } | TraceError::Timeout(_)
        )
    }
}
