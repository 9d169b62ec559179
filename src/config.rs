//! Engine configuration.
//!
//! Thresholds and limits are data, not code: they load from TOML with every
//! field defaulted, and are validated before an engine is built.
//!
//! ```toml
//! [resolver]
//! match_threshold = 0.9
//! top_k = 3
//!
//! [runtime]
//! workers = 8
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arbiter::Thresholds;
use crate::error::{ValidationError, VendorError, VendorResult};

/// Matching thresholds and retry limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Minimum top score for a similarity MATCH.
    pub match_threshold: f64,
    /// Minimum gap between the top two scores for a similarity MATCH.
    pub ambiguity_margin: f64,
    /// Scores below this are treated as no candidate at all.
    pub review_floor: f64,
    /// Maximum candidates returned per mention.
    pub top_k: usize,
    /// Records pre-filtered from the registry before scoring.
    pub candidate_pool_size: usize,
    /// Per-call collaborator timeout in milliseconds.
    pub collaborator_timeout_ms: u64,
    /// Total collaborator attempts per call, including the first.
    pub collaborator_attempts: u32,
    /// Threads serving collaborator calls. Caps the threads a hung
    /// collaborator can hold.
    pub collaborator_workers: usize,
    /// Collaborator calls allowed to wait for a free worker before new
    /// calls are rejected.
    pub collaborator_queue_capacity: usize,
    /// Optimistic write attempts before giving up.
    pub max_merge_attempts: u32,
    /// Base of the exponential backoff between retries.
    pub retry_backoff_ms: u64,
    /// Minimum collaborator confidence for a subsidiary link.
    pub subsidiary_threshold: f64,
    /// Similarity matches at or above this skip the subsidiary check.
    pub subsidiary_check_below: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.85,
            ambiguity_margin: 0.10,
            review_floor: 0.5,
            top_k: 5,
            candidate_pool_size: 25,
            collaborator_timeout_ms: 2000,
            collaborator_attempts: 2,
            collaborator_workers: 4,
            collaborator_queue_capacity: 16,
            max_merge_attempts: 8,
            retry_backoff_ms: 5,
            subsidiary_threshold: 0.7,
            subsidiary_check_below: 0.95,
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn check_unit(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} is outside [0, 1]")))
    }
}

fn check_nonzero(field: &str, value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        Err(invalid(field, "must be greater than zero"))
    } else {
        Ok(())
    }
}

impl ResolverConfig {
    /// Validate ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_unit("match_threshold", self.match_threshold)?;
        check_unit("ambiguity_margin", self.ambiguity_margin)?;
        check_unit("review_floor", self.review_floor)?;
        check_unit("subsidiary_threshold", self.subsidiary_threshold)?;
        check_unit("subsidiary_check_below", self.subsidiary_check_below)?;
        if self.review_floor > self.match_threshold {
            return Err(invalid(
                "review_floor",
                format!("{} exceeds match_threshold {}", self.review_floor, self.match_threshold),
            ));
        }
        check_nonzero("top_k", self.top_k as u64)?;
        check_nonzero("candidate_pool_size", self.candidate_pool_size as u64)?;
        if self.candidate_pool_size < self.top_k {
            return Err(invalid("candidate_pool_size", "must be at least top_k"));
        }
        check_nonzero("collaborator_timeout_ms", self.collaborator_timeout_ms)?;
        check_nonzero("collaborator_attempts", u64::from(self.collaborator_attempts))?;
        check_nonzero("collaborator_workers", self.collaborator_workers as u64)?;
        check_nonzero("collaborator_queue_capacity", self.collaborator_queue_capacity as u64)?;
        check_nonzero("max_merge_attempts", u64::from(self.max_merge_attempts))?;
        Ok(())
    }

    /// Arbiter thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        Thresholds {
            match_threshold: self.match_threshold,
            ambiguity_margin: self.ambiguity_margin,
            review_floor: self.review_floor,
        }
    }

    /// Per-call collaborator timeout.
    #[must_use]
    pub const fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Base backoff between retries.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Number of resolution worker threads.
    pub workers: usize,
    /// Maximum queued requests.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Rejects zero-sized pools.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_nonzero("workers", self.workers as u64)?;
        check_nonzero("queue_capacity", self.queue_capacity as u64)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Resolution thresholds and limits.
    pub resolver: ResolverConfig,
    /// Worker pool sizing.
    pub runtime: RuntimeConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Examples
    ///
    /// ```
    /// use vendor_identity::EngineConfig;
    ///
    /// let config = EngineConfig::from_toml_str("[resolver]\ntop_k = 3\n").unwrap();
    /// assert_eq!(config.resolver.top_k, 3);
    /// assert_eq!(config.runtime.workers, 4);
    /// ```
    pub fn from_toml_str(raw: &str) -> VendorResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| VendorError::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> VendorResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| VendorError::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Validates both sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.resolver.validate()?;
        self.runtime.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert!((config.resolver.match_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.resolver.top_k, 5);
        assert_eq!(config.runtime.queue_capacity, 1024);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [resolver]
            match_threshold = 0.9
            collaborator_timeout_ms = 500
            "#,
        )
        .unwrap();
        assert!((config.resolver.match_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.resolver.collaborator_timeout(), Duration::from_millis(500));
        assert_eq!(config.resolver.max_merge_attempts, 8);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let err = EngineConfig::from_toml_str("[resolver]\nmatch_threshold = 1.5\n").unwrap_err();
        assert!(err.is_validation());

        let err = EngineConfig::from_toml_str("[resolver]\nreview_floor = 0.9\nmatch_threshold = 0.8\n").unwrap_err();
        assert!(err.to_string().contains("review_floor"));

        let err = EngineConfig::from_toml_str("[runtime]\nworkers = 0\n").unwrap_err();
        assert!(err.is_validation());

        let err = EngineConfig::from_toml_str("[resolver]\ncollaborator_workers = 0\n").unwrap_err();
        assert!(err.to_string().contains("collaborator_workers"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = EngineConfig::from_toml_str("[resolver]\nmatch_treshold = 0.9\n").unwrap_err();
        assert!(matches!(err, VendorError::Config { .. }));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[resolver]\ntop_k = 2\n\n[runtime]\nworkers = 1").unwrap();
        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.resolver.top_k, 2);
        assert_eq!(config.runtime.workers, 1);
    }

    #[test]
    fn test_from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_path(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, VendorError::Config { .. }));
    }
}
