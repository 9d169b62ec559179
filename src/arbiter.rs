//! Verdict arbitration.
//!
//! Pure and deterministic: the same key and similarity evidence always
//! produce the same decision, with no registry or collaborator access.

use crate::index::KeyEvidence;
use crate::result::{MatchMethod, RankedCandidate, Verdict};
use crate::vendor::VendorId;

/// Tolerance for threshold comparisons.
const EPSILON: f64 = 1e-9;

/// Decision thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum top score for a similarity match.
    pub match_threshold: f64,
    /// Required lead of the top score over the runner-up.
    pub ambiguity_margin: f64,
    /// Scores below this never warrant review.
    pub review_floor: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            match_threshold: 0.85,
            ambiguity_margin: 0.10,
            review_floor: 0.5,
        }
    }
}

/// What similarity matching produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityEvidence {
    /// Candidates, best first. May be empty.
    Ranked(Vec<RankedCandidate>),
    /// The collaborator failed or timed out.
    Unavailable {
        /// Why scoring failed.
        reason: String,
    },
    /// Similarity was skipped because key evidence was decisive.
    NotRun,
}

/// The arbiter's output.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbiterDecision {
    /// The verdict.
    pub verdict: Verdict,
    /// Matched vendor, for `Match` only.
    pub vendor_id: Option<VendorId>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// How the verdict was reached.
    pub method: MatchMethod,
    /// Human-readable explanation.
    pub reasoning: String,
}

impl ArbiterDecision {
    fn new(verdict: Verdict, vendor_id: Option<VendorId>, confidence: f64, method: MatchMethod, reasoning: String) -> Self {
        Self {
            verdict,
            vendor_id,
            confidence: confidence.clamp(0.0, 1.0),
            method,
            reasoning,
        }
    }
}

/// Combine key and similarity evidence into a verdict.
///
/// # Examples
///
/// ```
/// use vendor_identity::arbiter::{arbitrate, SimilarityEvidence, Thresholds};
/// use vendor_identity::index::KeyEvidence;
/// use vendor_identity::Verdict;
///
/// let decision = arbitrate(&Thresholds::default(), &KeyEvidence::None, &SimilarityEvidence::Ranked(vec![]));
/// assert_eq!(decision.verdict, Verdict::NewVendor);
/// assert_eq!(decision.confidence, 1.0);
/// ```
#[must_use]
pub fn arbitrate(thresholds: &Thresholds, key: &KeyEvidence, similarity: &SimilarityEvidence) -> ArbiterDecision {
    match key {
        KeyEvidence::Match { vendor_id, key } => {
            return ArbiterDecision::new(
                Verdict::Match,
                Some(*vendor_id),
                1.0,
                MatchMethod::KeyMatch,
                format!("exact key match on {key}"),
            );
        }
        KeyEvidence::Conflict { key, vendors } => {
            let ids: Vec<String> = vendors.iter().map(ToString::to_string).collect();
            return ArbiterDecision::new(
                Verdict::Ambiguous,
                None,
                1.0,
                MatchMethod::KeyMatch,
                format!("key conflict on {key}: held by [{}]", ids.join(", ")),
            );
        }
        KeyEvidence::None => {}
    }

    let candidates = match similarity {
        SimilarityEvidence::Unavailable { reason } => {
            return ArbiterDecision::new(
                Verdict::Ambiguous,
                None,
                0.0,
                MatchMethod::None,
                format!("no key match and similarity unavailable: {reason}"),
            );
        }
        SimilarityEvidence::NotRun => &[][..],
        SimilarityEvidence::Ranked(c) => c.as_slice(),
    };

    let Some(top) = candidates.first() else {
        return ArbiterDecision::new(
            Verdict::NewVendor,
            None,
            1.0,
            MatchMethod::None,
            "no key match and no similar candidates".to_string(),
        );
    };

    let second = candidates.get(1).map_or(0.0, |c| c.score);
    let gap = top.score - second;

    if top.score >= thresholds.match_threshold - EPSILON {
        if gap >= thresholds.ambiguity_margin - EPSILON {
            return ArbiterDecision::new(
                Verdict::Match,
                Some(top.vendor_id),
                top.score,
                MatchMethod::SimilarityMatch,
                format!(
                    "top candidate {} scored {:.3} with margin {:.3} over the next ({})",
                    top.vendor_id, top.score, gap, top.justification
                ),
            );
        }
        return ArbiterDecision::new(
            Verdict::Ambiguous,
            None,
            top.score,
            MatchMethod::SimilarityMatch,
            format!(
                "top candidates {:.3} and {:.3} are within margin {:.3}",
                top.score, second, thresholds.ambiguity_margin
            ),
        );
    }

    if top.score >= thresholds.review_floor - EPSILON {
        return ArbiterDecision::new(
            Verdict::Ambiguous,
            None,
            top.score,
            MatchMethod::SimilarityMatch,
            format!(
                "top candidate {} scored {:.3}, below match threshold {:.3}",
                top.vendor_id, top.score, thresholds.match_threshold
            ),
        );
    }

    ArbiterDecision::new(
        Verdict::NewVendor,
        None,
        1.0 - top.score,
        MatchMethod::None,
        format!("best candidate scored {:.3}, below review floor {:.3}", top.score, thresholds.review_floor),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MatchedKey;
    use chrono::Utc;

    fn candidate(score: f64) -> RankedCandidate {
        RankedCandidate {
            vendor_id: VendorId::new(),
            score,
            justification: "stub".to_string(),
            created_at: Utc::now(),
        }
    }

    fn ranked(scores: &[f64]) -> SimilarityEvidence {
        SimilarityEvidence::Ranked(scores.iter().copied().map(candidate).collect())
    }

    fn decide(scores: &[f64]) -> ArbiterDecision {
        arbitrate(&Thresholds::default(), &KeyEvidence::None, &ranked(scores))
    }

    #[test]
    fn test_key_match_is_terminal() {
        let id = VendorId::new();
        let key = KeyEvidence::Match {
            vendor_id: id,
            key: MatchedKey::TaxId("DE123456789".to_string()),
        };
        let d = arbitrate(&Thresholds::default(), &key, &ranked(&[0.1]));
        assert_eq!(d.verdict, Verdict::Match);
        assert_eq!(d.vendor_id, Some(id));
        assert_eq!(d.method, MatchMethod::KeyMatch);
        assert!((d.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_key_conflict_is_ambiguous() {
        let key = KeyEvidence::Conflict {
            key: MatchedKey::Domain("acme.com".to_string()),
            vendors: vec![VendorId::new(), VendorId::new()],
        };
        let d = arbitrate(&Thresholds::default(), &key, &SimilarityEvidence::NotRun);
        assert_eq!(d.verdict, Verdict::Ambiguous);
        assert_eq!(d.method, MatchMethod::KeyMatch);
        assert!(d.reasoning.contains("acme.com"));
    }

    #[test]
    fn test_clear_similarity_match() {
        let d = decide(&[0.95, 0.60]);
        assert_eq!(d.verdict, Verdict::Match);
        assert_eq!(d.method, MatchMethod::SimilarityMatch);
        assert!((d.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_close_scores_are_ambiguous() {
        let d = decide(&[0.90, 0.89]);
        assert_eq!(d.verdict, Verdict::Ambiguous);
        assert!((d.confidence - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_single_candidate_gap_is_top() {
        assert_eq!(decide(&[0.86]).verdict, Verdict::Match);
    }

    #[test]
    fn test_threshold_boundaries_tolerate_float_error() {
        // 0.85 exactly, reached through arithmetic.
        let d = decide(&[0.1 + 0.75]);
        assert_eq!(d.verdict, Verdict::Match);
        let d = decide(&[0.95, 0.85]);
        assert_eq!(d.verdict, Verdict::Match);
    }

    #[test]
    fn test_weak_guess_is_ambiguous() {
        let d = decide(&[0.6]);
        assert_eq!(d.verdict, Verdict::Ambiguous);
        assert_eq!(d.vendor_id, None);
    }

    #[test]
    fn test_low_scores_are_new_vendor() {
        let d = decide(&[0.3, 0.1]);
        assert_eq!(d.verdict, Verdict::NewVendor);
        assert_eq!(d.method, MatchMethod::None);
        assert!((d.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_no_candidates_is_confident_new_vendor() {
        let d = decide(&[]);
        assert_eq!(d.verdict, Verdict::NewVendor);
        assert!((d.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unavailable_collaborator_degrades() {
        let d = arbitrate(
            &Thresholds::default(),
            &KeyEvidence::None,
            &SimilarityEvidence::Unavailable {
                reason: "timed out".to_string(),
            },
        );
        assert_eq!(d.verdict, Verdict::Ambiguous);
        assert_eq!(d.method, MatchMethod::None);
        assert!(d.confidence.abs() < f64::EPSILON);
    }
}
