//! Resolution outcome types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vendor::{AdditiveUpdate, VendorId};

/// Final decision for a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// The mention refers to an existing vendor.
    Match,
    /// The mention refers to a vendor not yet in the registry.
    NewVendor,
    /// The evidence does not support an automatic decision.
    Ambiguous,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Match => "MATCH",
            Self::NewVendor => "NEW_VENDOR",
            Self::Ambiguous => "AMBIGUOUS",
        })
    }
}

/// Which evidence decided the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMethod {
    /// Exact tax-id, domain or surrogate-key match.
    KeyMatch,
    /// Collaborator similarity score.
    SimilarityMatch,
    /// No method produced a decision.
    None,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::KeyMatch => "KEY_MATCH",
            Self::SimilarityMatch => "SIMILARITY_MATCH",
            Self::None => "NONE",
        })
    }
}

/// A candidate considered by similarity matching, in rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// Candidate vendor.
    pub vendor_id: VendorId,
    /// Clamped to `[0, 1]`.
    pub score: f64,
    /// Collaborator justification.
    pub justification: String,
    /// Candidate creation time, the tie-breaker.
    pub created_at: DateTime<Utc>,
}

/// A proposed and applied parent link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsidiaryLink {
    /// Parent vendor.
    pub parent_vendor_id: VendorId,
    /// Collaborator confidence.
    pub confidence: f64,
    /// Collaborator justification.
    pub justification: String,
}

/// Outcome of resolving one mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Final verdict.
    pub verdict: Verdict,

    /// Matched record on `Match`, created record on `NewVendor`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<VendorId>,

    /// In `[0, 1]`.
    pub confidence: f64,
    /// How the verdict was reached.
    pub method: MatchMethod,
    /// Human-readable explanation.
    pub reasoning: String,

    /// Ranked candidates considered; the review queue for `Ambiguous`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<RankedCandidate>,

    /// Additive updates actually written to the matched record.
    #[serde(default)]
    pub database_updates: Vec<AdditiveUpdate>,

    /// Parent link applied during this resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsidiary_link: Option<SubsidiaryLink>,

    /// True if this call created the record.
    #[serde(default)]
    pub created: bool,
}

impl MatchResult {
    /// True for `Match`.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self.verdict, Verdict::Match)
    }

    /// True for `NewVendor`.
    #[must_use]
    pub const fn is_new_vendor(&self) -> bool {
        matches!(self.verdict, Verdict::NewVendor)
    }

    /// True for `Ambiguous`.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self.verdict, Verdict::Ambiguous)
    }
}
