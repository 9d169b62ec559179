//! Inference collaborator boundary.
//!
//! Similarity scoring and subsidiary judgement are delegated to an external,
//! possibly slow and non-deterministic service. The engine only sees the
//! narrow [`InferenceCollaborator`] trait, always through a
//! [`BoundedCollaborator`] that enforces the call timeout.

mod bounded;
mod lexical;

use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;
use crate::normalize::NormalizedMention;
use crate::vendor::{VendorId, VendorRecord};

pub use bounded::BoundedCollaborator;
pub use lexical::LexicalCollaborator;

/// One scored candidate returned by the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Scored vendor.
    pub vendor_id: VendorId,
    /// Expected in `[0, 1]`; out-of-range values are clamped by the matcher.
    pub score: f64,
    /// Why the collaborator scored it so.
    pub justification: String,
}

impl CandidateScore {
    /// Create a scored candidate.
    pub fn new(vendor_id: VendorId, score: f64, justification: impl Into<String>) -> Self {
        Self {
            vendor_id,
            score,
            justification: justification.into(),
        }
    }
}

/// Verdict on whether a mention is a subsidiary of a given vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsidiaryJudgement {
    /// True if the mention is a subsidiary of the parent.
    pub is_subsidiary: bool,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Why.
    pub justification: String,
}

impl SubsidiaryJudgement {
    /// A negative judgement.
    pub fn negative(justification: impl Into<String>) -> Self {
        Self {
            is_subsidiary: false,
            confidence: 0.0,
            justification: justification.into(),
        }
    }

    /// A positive judgement with the given confidence.
    pub fn positive(confidence: f64, justification: impl Into<String>) -> Self {
        Self {
            is_subsidiary: true,
            confidence,
            justification: justification.into(),
        }
    }
}

/// External similarity and subsidiary oracle.
///
/// Treated as stateless and side-effect free. Implementations report
/// transport trouble as `CollaboratorUnavailable`; timeouts are imposed by
/// [`BoundedCollaborator`].
pub trait InferenceCollaborator: Send + Sync {
    /// Score `mention` against every record of `pool`.
    fn score(
        &self,
        mention: &NormalizedMention,
        pool: &[VendorRecord],
    ) -> Result<Vec<CandidateScore>, ResolutionError>;

    /// Judge whether `mention` names a subsidiary of `parent`.
    fn judge_subsidiary(
        &self,
        mention: &NormalizedMention,
        parent: &VendorRecord,
    ) -> Result<SubsidiaryJudgement, ResolutionError>;
}
