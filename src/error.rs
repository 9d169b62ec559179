//! Error types for vendor identity resolution.
//!
//! All errors are strongly typed using thiserror so callers can
//! pattern match on specific conditions (a key conflict is handled very
//! differently from a malformed mention).

use thiserror::Error;

use crate::storage::StorageError;
use crate::vendor::VendorId;

/// Validation errors raised before any matching takes place.
///
/// These are terminal: retrying the same input yields the same error.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The mention name is empty or normalizes to nothing.
    #[error("Vendor name cannot be empty")]
    EmptyName,

    /// The tax identifier could not be normalized.
    #[error("Tax identifier '{value}' is malformed: {reason}")]
    MalformedTaxId {
        /// Raw value as supplied.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required input field is absent.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        /// Configuration key.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An input field is present but unusable.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors raised while resolving a mention against the registry.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// A deterministic key points at more than one vendor.
    #[error("Key conflict on '{key}': maps to vendors {vendors:?}")]
    KeyConflict {
        /// The contested key, e.g. `tax_id:DE123456789`.
        key: String,
        /// Vendors involved.
        vendors: Vec<VendorId>,
    },

    /// The inference collaborator did not answer in time.
    #[error("Inference collaborator timed out after {timeout_ms}ms")]
    CollaboratorTimeout {
        /// Per-call timeout.
        timeout_ms: u64,
    },

    /// The inference collaborator failed.
    #[error("Inference collaborator unavailable: {message}")]
    CollaboratorUnavailable {
        /// Failure description.
        message: String,
    },

    /// Optimistic writes kept losing to concurrent updates.
    #[error("Concurrent update on vendor {vendor_id} lost the race {attempts} times")]
    MergeConflict {
        /// Vendor being written.
        vendor_id: VendorId,
        /// Attempts made.
        attempts: u32,
    },

    /// A parent link would close a loop.
    #[error("Linking {child} to parent {parent} would create a cycle")]
    CycleDetected {
        /// Record receiving the parent.
        child: VendorId,
        /// Proposed parent.
        parent: VendorId,
    },

    /// A vendor referenced during resolution disappeared.
    #[error("Vendor not found: {id}")]
    VendorNotFound {
        /// Missing vendor.
        id: VendorId,
    },

    /// The runtime queue is full.
    #[error("Resolution queue is full (capacity {capacity})")]
    QueueFull {
        /// Queue capacity.
        capacity: usize,
    },

    /// The worker pool has shut down.
    #[error("Resolution worker disconnected")]
    Disconnected,

    /// Waiting for a queued resolution timed out.
    #[error("Resolution timed out after {duration_ms}ms")]
    Timeout {
        /// How long the caller waited.
        duration_ms: u64,
    },
}

/// Top-level error type for the resolution engine.
#[derive(Debug, Error)]
pub enum VendorError {
    /// Malformed input or configuration.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Resolution failed or needs review.
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Registry failure.
    #[error("Registry error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong.
        message: String,
    },

    /// Invariant violation inside the engine.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl VendorError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a resolution error.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }

    /// Returns true if this error is transient and the request may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Config { .. } | Self::Internal { .. } => false,
            Self::Resolution(e) => matches!(
                e,
                ResolutionError::MergeConflict { .. }
                    | ResolutionError::CollaboratorTimeout { .. }
                    | ResolutionError::QueueFull { .. }
                    | ResolutionError::Timeout { .. }
            ),
            Self::Storage(e) => matches!(e, StorageError::VersionConflict { .. }),
        }
    }
}

/// Result type alias for resolution operations.
pub type VendorResult<T> = Result<T, VendorError>;
