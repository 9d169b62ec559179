//! Similarity candidate search.
//!
//! Pre-filters the registry into a bounded pool, lets the collaborator score
//! it, then sanitizes and ranks the answers deterministically.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::arbiter::SimilarityEvidence;
use crate::error::{ResolutionError, VendorError, VendorResult};
use crate::index::tax_id_compatible;
use crate::inference::InferenceCollaborator;
use crate::normalize::NormalizedMention;
use crate::result::RankedCandidate;
use crate::storage::VendorRegistry;
use crate::vendor::{VendorId, VendorRecord};

/// Finds and ranks similar vendors for a mention.
#[derive(Clone)]
pub struct SimilarityMatcher {
    registry: Arc<dyn VendorRegistry>,
    collaborator: Arc<dyn InferenceCollaborator>,
    top_k: usize,
    pool_size: usize,
}

impl SimilarityMatcher {
    /// Create a matcher returning at most `top_k` of at most `pool_size` pre-filtered records.
    pub fn new(
        registry: Arc<dyn VendorRegistry>,
        collaborator: Arc<dyn InferenceCollaborator>,
        top_k: usize,
        pool_size: usize,
    ) -> Self {
        Self {
            registry,
            collaborator,
            top_k: top_k.max(1),
            pool_size: pool_size.max(1),
        }
    }

    /// Registry records that could plausibly be the mentioned vendor.
    ///
    /// Records must share a name token (canonical or alias), must not list
    /// only countries other than the mention's, and must not hold tax ids
    /// that exclude the mention's.
    pub fn candidate_pool(&self, mention: &NormalizedMention) -> VendorResult<Vec<VendorRecord>> {
        let fetched = self
            .registry
            .find_by_name_tokens(&mention.name_tokens, self.pool_size.saturating_mul(2))?;
        Ok(fetched
            .into_iter()
            .filter(|r| country_compatible(r, mention.country.as_deref()))
            .filter(|r| tax_id_compatible(r, mention.tax_id.as_deref()))
            .take(self.pool_size)
            .collect())
    }

    /// Top-K candidates, best first.
    ///
    /// # Errors
    /// Collaborator failures surface as `CollaboratorTimeout` or
    /// `CollaboratorUnavailable`; registry failures as `Storage`.
    pub fn find_candidates(&self, mention: &NormalizedMention) -> VendorResult<Vec<RankedCandidate>> {
        let pool = self.candidate_pool(mention)?;
        if pool.is_empty() {
            return Ok(Vec::new());
        }
        let scores = self.collaborator.score(mention, &pool)?;
        let ranked = rank(&pool, scores.into_iter().map(|s| (s.vendor_id, s.score, s.justification)), self.top_k);
        debug!(pool = pool.len(), ranked = ranked.len(), "similarity candidates ranked");
        Ok(ranked)
    }

    /// Like [`find_candidates`](Self::find_candidates), but folds
    /// collaborator failure into [`SimilarityEvidence::Unavailable`].
    pub fn evidence(&self, mention: &NormalizedMention) -> VendorResult<SimilarityEvidence> {
        match self.find_candidates(mention) {
            Ok(ranked) => Ok(SimilarityEvidence::Ranked(ranked)),
            Err(VendorError::Resolution(
                err @ (ResolutionError::CollaboratorTimeout { .. } | ResolutionError::CollaboratorUnavailable { .. }),
            )) => {
                warn!(name = %mention.normalized_name, error = %err, "similarity degraded to key-only resolution");
                Ok(SimilarityEvidence::Unavailable { reason: err.to_string() })
            }
            Err(err) => Err(err),
        }
    }
}

fn country_compatible(record: &VendorRecord, country: Option<&str>) -> bool {
    match country {
        None => true,
        Some(c) => record.countries.is_empty() || record.countries.contains(c),
    }
}

/// Sanitizes raw collaborator scores and ranks them.
///
/// Scores for ids outside `pool` and non-finite scores are dropped, the
/// rest clamped to `[0, 1]`, and only the best score per vendor kept. Ties
/// break by earliest `created_at`, then by vendor id.
fn rank(
    pool: &[VendorRecord],
    scores: impl IntoIterator<Item = (VendorId, f64, String)>,
    top_k: usize,
) -> Vec<RankedCandidate> {
    let by_id: HashMap<VendorId, &VendorRecord> = pool.iter().map(|r| (r.vendor_id, r)).collect();
    let mut best: HashMap<VendorId, RankedCandidate> = HashMap::new();

    for (vendor_id, score, justification) in scores {
        let Some(record) = by_id.get(&vendor_id) else {
            continue;
        };
        if !score.is_finite() {
            continue;
        }
        let score = score.clamp(0.0, 1.0);
        let candidate = RankedCandidate {
            vendor_id,
            score,
            justification,
            created_at: record.created_at,
        };
        match best.get(&vendor_id) {
            Some(existing) if existing.score >= score => {}
            _ => {
                best.insert(vendor_id, candidate);
            }
        }
    }

    let mut ranked: Vec<RankedCandidate> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.vendor_id.cmp(&b.vendor_id))
    });
    ranked.truncate(top_k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::inference::{CandidateScore, SubsidiaryJudgement};
    use crate::normalize::normalize_mention;
    use crate::storage::InMemoryVendorRegistry;
    use crate::vendor::VendorMention;

    fn record(name: &str) -> VendorRecord {
        let n = normalize_mention(&VendorMention::named(name)).unwrap();
        VendorRecord::from_mention(VendorId::new(), &n, "test")
    }

    /// Returns the same fixed score for every pool member.
    struct Flat(f64);

    impl InferenceCollaborator for Flat {
        fn score(&self, _: &NormalizedMention, pool: &[VendorRecord]) -> Result<Vec<CandidateScore>, ResolutionError> {
            Ok(pool.iter().map(|r| CandidateScore::new(r.vendor_id, self.0, "flat")).collect())
        }

        fn judge_subsidiary(&self, _: &NormalizedMention, _: &VendorRecord) -> Result<SubsidiaryJudgement, ResolutionError> {
            Ok(SubsidiaryJudgement::negative("flat"))
        }
    }

    struct Down;

    impl InferenceCollaborator for Down {
        fn score(&self, _: &NormalizedMention, _: &[VendorRecord]) -> Result<Vec<CandidateScore>, ResolutionError> {
            Err(ResolutionError::CollaboratorUnavailable {
                message: "connection refused".to_string(),
            })
        }

        fn judge_subsidiary(&self, _: &NormalizedMention, _: &VendorRecord) -> Result<SubsidiaryJudgement, ResolutionError> {
            Err(ResolutionError::CollaboratorUnavailable {
                message: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn test_rank_ties_break_by_created_at() {
        let mut older = record("Acme Tools");
        let newer = record("Acme Tooling");
        older.created_at = newer.created_at - Duration::seconds(60);

        let pool = vec![newer.clone(), older.clone()];
        let ranked = rank(
            &pool,
            vec![
                (newer.vendor_id, 0.9, String::new()),
                (older.vendor_id, 0.9, String::new()),
            ],
            5,
        );
        assert_eq!(ranked[0].vendor_id, older.vendor_id);
        assert_eq!(ranked[1].vendor_id, newer.vendor_id);
    }

    #[test]
    fn test_rank_sanitizes_scores() {
        let a = record("Alpha");
        let b = record("Beta");
        let pool = vec![a.clone(), b.clone()];
        let ranked = rank(
            &pool,
            vec![
                (a.vendor_id, 1.7, "too high".to_string()),
                (b.vendor_id, f64::NAN, "nan".to_string()),
                (VendorId::new(), 0.99, "not in pool".to_string()),
                (a.vendor_id, 0.2, "lower duplicate".to_string()),
            ],
            5,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].vendor_id, a.vendor_id);
        assert!((ranked[0].score - 1.0).abs() < f64::EPSILON);
        assert_eq!(ranked[0].justification, "too high");
    }

    #[test]
    fn test_rank_truncates_to_top_k() {
        let pool: Vec<VendorRecord> = (0..8).map(|i| record(&format!("Vendor {i}"))).collect();
        let scores = pool.iter().map(|r| (r.vendor_id, 0.5, String::new()));
        assert_eq!(rank(&pool, scores, 3).len(), 3);
    }

    #[test]
    fn test_empty_pool_skips_collaborator() {
        let registry = Arc::new(InMemoryVendorRegistry::new());
        let matcher = SimilarityMatcher::new(registry, Arc::new(Down), 5, 25);
        let mention = normalize_mention(&VendorMention::named("Nobody")).unwrap();
        assert!(matcher.find_candidates(&mention).unwrap().is_empty());
    }

    #[test]
    fn test_pool_respects_country() {
        let registry = Arc::new(InMemoryVendorRegistry::new());
        let us = normalize_mention(&VendorMention::named("Initech").with_country("US")).unwrap();
        let de = normalize_mention(&VendorMention::named("Initech").with_country("DE")).unwrap();
        registry.create(VendorRecord::from_mention(VendorId::new(), &us, "t")).unwrap();
        registry.create(VendorRecord::from_mention(VendorId::new(), &de, "t")).unwrap();

        let matcher = SimilarityMatcher::new(registry, Arc::new(Flat(0.9)), 5, 25);
        let pool = matcher.candidate_pool(&us).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool[0].countries.contains("US"));
    }

    #[test]
    fn test_pool_excludes_conflicting_tax_id() {
        let registry = Arc::new(InMemoryVendorRegistry::new());
        let de = normalize_mention(&VendorMention::named("Globex GmbH").with_tax_id("DE111111111")).unwrap();
        let bare = normalize_mention(&VendorMention::named("Globex Trading")).unwrap();
        registry.create(VendorRecord::from_mention(VendorId::new(), &de, "t")).unwrap();
        let bare_id = registry.create(VendorRecord::from_mention(VendorId::new(), &bare, "t")).unwrap();

        let matcher = SimilarityMatcher::new(registry, Arc::new(Flat(0.99)), 5, 25);
        let fr = normalize_mention(&VendorMention::named("Globex SARL").with_tax_id("FR22222222222")).unwrap();
        let pool = matcher.candidate_pool(&fr).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].vendor_id, bare_id);

        // Without a tax id on the mention nothing is excluded.
        let untaxed = normalize_mention(&VendorMention::named("Globex")).unwrap();
        assert_eq!(matcher.candidate_pool(&untaxed).unwrap().len(), 2);
    }

    #[test]
    fn test_unavailable_collaborator_becomes_evidence() {
        let registry = Arc::new(InMemoryVendorRegistry::new());
        let n = normalize_mention(&VendorMention::named("Globex")).unwrap();
        registry.create(VendorRecord::from_mention(VendorId::new(), &n, "t")).unwrap();

        let matcher = SimilarityMatcher::new(registry, Arc::new(Down), 5, 25);
        assert!(matches!(matcher.evidence(&n).unwrap(), SimilarityEvidence::Unavailable { .. }));
    }
}
