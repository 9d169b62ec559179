//! Offline, deterministic collaborator based on Jaro-Winkler similarity.

use strsim::jaro_winkler;

use crate::error::ResolutionError;
use crate::inference::{CandidateScore, InferenceCollaborator, SubsidiaryJudgement};
use crate::normalize::{normalize_name, NormalizedMention};
use crate::subsidiary::{cue_parent_name, is_domain_suffix, is_name_root};
use crate::vendor::VendorRecord;

const DOMAIN_BONUS: f64 = 0.1;
const COUNTRY_PENALTY: f64 = 0.1;
/// Applied once when the mention looks like an offshoot of the record.
const OFFSHOOT_PENALTY: f64 = 0.4;

/// Scores by the best Jaro-Winkler similarity between the mention's
/// normalized name and a record's normalized names, adjusted by domain and
/// country evidence.
///
/// A mention whose name extends the record's legal root, or whose email
/// domain is a subdomain of one of the record's, is scored down so it
/// resolves as a new vendor and goes through subsidiary linking instead of
/// becoming an alias.
///
/// Used by the CLI and as a reference collaborator in tests. Production
/// deployments plug in a semantic service instead.
#[derive(Debug, Clone)]
pub struct LexicalCollaborator {
    cue_confidence: f64,
    domain_confidence: f64,
    root_confidence: f64,
}

impl Default for LexicalCollaborator {
    fn default() -> Self {
        Self {
            cue_confidence: 0.9,
            domain_confidence: 0.8,
            root_confidence: 0.75,
        }
    }
}

impl LexicalCollaborator {
    /// Collaborator with default confidences.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn best_name(mention: &NormalizedMention, record: &VendorRecord) -> (f64, String) {
        let mut best = (jaro_winkler(&mention.normalized_name, &record.normalized_name), record.normalized_name.clone());
        for alias in &record.aliases {
            let Some(alias) = normalize_name(alias) else {
                continue;
            };
            let score = jaro_winkler(&mention.normalized_name, &alias);
            if score > best.0 {
                best = (score, alias);
            }
        }
        best
    }

    fn offshoot_reason(mention: &NormalizedMention, record: &VendorRecord) -> Option<String> {
        if is_name_root(&record.normalized_name, &mention.normalized_name) {
            return Some(format!("name extends '{}'", record.normalized_name));
        }
        let domain = mention.domain.as_ref()?;
        record
            .domains
            .iter()
            .find(|d| is_domain_suffix(domain, d))
            .map(|d| format!("{domain} is a subdomain of {d}"))
    }
}

impl InferenceCollaborator for LexicalCollaborator {
    fn score(
        &self,
        mention: &NormalizedMention,
        pool: &[VendorRecord],
    ) -> Result<Vec<CandidateScore>, ResolutionError> {
        Ok(pool
            .iter()
            .map(|record| {
                let (name_score, name) = Self::best_name(mention, record);
                let mut score = name_score;
                let mut why = format!("name '{}' ~ '{}' = {:.3}", mention.normalized_name, name, name_score);

                if mention.domain.as_ref().is_some_and(|d| record.domains.contains(d)) {
                    score += DOMAIN_BONUS;
                    why.push_str(", shared email domain");
                }
                if let Some(country) = &mention.country {
                    if !record.countries.is_empty() && !record.countries.contains(country) {
                        score -= COUNTRY_PENALTY;
                        why.push_str(", country differs");
                    }
                }
                if let Some(reason) = Self::offshoot_reason(mention, record) {
                    score -= OFFSHOOT_PENALTY;
                    why.push_str(", likely offshoot: ");
                    why.push_str(&reason);
                }

                CandidateScore::new(record.vendor_id, score.clamp(0.0, 1.0), why)
            })
            .collect())
    }

    fn judge_subsidiary(
        &self,
        mention: &NormalizedMention,
        parent: &VendorRecord,
    ) -> Result<SubsidiaryJudgement, ResolutionError> {
        if let Some(cued) = cue_parent_name(&mention.display_name) {
            if cued == parent.normalized_name || parent.names().any(|n| normalize_name(n).as_deref() == Some(cued.as_str())) {
                return Ok(SubsidiaryJudgement::positive(
                    self.cue_confidence,
                    format!("mention names '{}' as its parent", parent.canonical_name),
                ));
            }
        }

        if let Some(domain) = &mention.domain {
            if let Some(parent_domain) = parent.domains.iter().find(|d| is_domain_suffix(domain, d)) {
                return Ok(SubsidiaryJudgement::positive(
                    self.domain_confidence,
                    format!("domain {domain} is a subdomain of {parent_domain}"),
                ));
            }
        }

        if is_name_root(&parent.normalized_name, &mention.normalized_name) {
            return Ok(SubsidiaryJudgement::positive(
                self.root_confidence,
                format!("name extends legal root '{}'", parent.normalized_name),
            ));
        }

        Ok(SubsidiaryJudgement::negative("no shared root, domain or cue"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_mention;
    use crate::vendor::{VendorId, VendorMention};

    fn record(mention: VendorMention) -> VendorRecord {
        let n = normalize_mention(&mention).unwrap();
        VendorRecord::from_mention(VendorId::new(), &n, "test")
    }

    fn normalized(mention: VendorMention) -> NormalizedMention {
        normalize_mention(&mention).unwrap()
    }

    #[test]
    fn test_identical_names_score_one() {
        let rec = record(VendorMention::named("Globex Corporation"));
        let scores = LexicalCollaborator::new()
            .score(&normalized(VendorMention::named("GLOBEX Corp.")), std::slice::from_ref(&rec))
            .unwrap();
        assert_eq!(scores.len(), 1);
        assert!((scores[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unrelated_names_score_low() {
        let rec = record(VendorMention::named("Globex"));
        let scores = LexicalCollaborator::new()
            .score(&normalized(VendorMention::named("Umbrella Pharmaceuticals")), &[rec])
            .unwrap();
        assert!(scores[0].score < 0.7);
    }

    #[test]
    fn test_country_mismatch_penalised() {
        let rec = record(VendorMention::named("Initech").with_country("US"));
        let same = LexicalCollaborator::new()
            .score(&normalized(VendorMention::named("Initech").with_country("US")), std::slice::from_ref(&rec))
            .unwrap();
        let other = LexicalCollaborator::new()
            .score(&normalized(VendorMention::named("Initech").with_country("DE")), &[rec])
            .unwrap();
        assert!(other[0].score < same[0].score);
    }

    #[test]
    fn test_offshoot_scores_below_review_floor() {
        let parent = record(VendorMention::named("Acme").with_email("ap@acme.com"));
        let collaborator = LexicalCollaborator::new();

        let by_name = collaborator
            .score(&normalized(VendorMention::named("Acme Europe")), std::slice::from_ref(&parent))
            .unwrap();
        assert!(by_name[0].score < 0.5, "scored {}", by_name[0].score);
        assert!(by_name[0].justification.contains("offshoot"));

        let by_domain = collaborator
            .score(&normalized(VendorMention::named("Acme").with_email("ap@eu.acme.com")), &[parent])
            .unwrap();
        assert!(by_domain[0].score < 0.7, "scored {}", by_domain[0].score);
    }

    #[test]
    fn test_subsidiary_by_domain_suffix() {
        let parent = record(VendorMention::named("Acme").with_email("ap@acme.com"));
        let judgement = LexicalCollaborator::new()
            .judge_subsidiary(&normalized(VendorMention::named("Acme Europe").with_email("ap@eu.acme.com")), &parent)
            .unwrap();
        assert!(judgement.is_subsidiary);
    }

    #[test]
    fn test_subsidiary_by_cue() {
        let parent = record(VendorMention::named("Globex Corporation"));
        let judgement = LexicalCollaborator::new()
            .judge_subsidiary(
                &normalized(VendorMention::named("Cypress Logistics, a division of Globex Corp")),
                &parent,
            )
            .unwrap();
        assert!(judgement.is_subsidiary);
        assert!(judgement.confidence >= 0.9);
    }

    #[test]
    fn test_unrelated_is_not_subsidiary() {
        let parent = record(VendorMention::named("Globex"));
        let judgement = LexicalCollaborator::new()
            .judge_subsidiary(&normalized(VendorMention::named("Initech")), &parent)
            .unwrap();
        assert!(!judgement.is_subsidiary);
    }
}
