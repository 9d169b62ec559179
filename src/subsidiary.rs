//! Subsidiary detection.
//!
//! Gathers plausible parents for a mention from explicit cues ("a division
//! of X"), domain suffixes and legal-name roots, then asks the collaborator
//! to judge each one. Linking itself goes through the merge applier.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::error::VendorResult;
use crate::inference::InferenceCollaborator;
use crate::normalize::{normalize_name, NormalizedMention};
use crate::result::SubsidiaryLink;
use crate::storage::VendorRegistry;
use crate::vendor::{VendorId, VendorRecord};

const EPSILON: f64 = 1e-9;

fn cue_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:an?\s+)?(?:division|subsidiary|affiliate|unit|part|member)\s+of\s+(?:the\s+)?(.+?)\s*[)\].]*\s*$").ok()
    })
    .as_ref()
}

/// Normalized name of the parent named by an explicit cue, if any.
pub(crate) fn cue_parent_name(display_name: &str) -> Option<String> {
    let caps = cue_regex()?.captures(display_name)?;
    normalize_name(caps.get(1)?.as_str())
}

/// True if `domain` is a proper subdomain of `parent`.
pub(crate) fn is_domain_suffix(domain: &str, parent: &str) -> bool {
    domain.len() > parent.len()
        && domain.ends_with(parent)
        && domain.as_bytes()[domain.len() - parent.len() - 1] == b'.'
}

/// True if the tokens of `root` are a strict prefix of the tokens of `name`.
pub(crate) fn is_name_root(root: &str, name: &str) -> bool {
    let root: Vec<&str> = root.split(' ').collect();
    let name: Vec<&str> = name.split(' ').collect();
    root.len() < name.len() && name.starts_with(&root)
}

/// Proposes parent vendors for a mention.
#[derive(Clone)]
pub struct SubsidiaryLinker {
    registry: Arc<dyn VendorRegistry>,
    collaborator: Arc<dyn InferenceCollaborator>,
    threshold: f64,
    max_candidates: usize,
}

impl SubsidiaryLinker {
    /// Linker accepting judgements at or above `threshold`.
    pub fn new(
        registry: Arc<dyn VendorRegistry>,
        collaborator: Arc<dyn InferenceCollaborator>,
        threshold: f64,
        max_candidates: usize,
    ) -> Self {
        Self {
            registry,
            collaborator,
            threshold,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Possible parents of the mention, excluding `vendor_id` itself.
    pub fn parent_candidates(&self, mention: &NormalizedMention, vendor_id: VendorId) -> VendorResult<Vec<VendorRecord>> {
        let mut seen: HashSet<VendorId> = HashSet::from([vendor_id]);
        let mut out: Vec<VendorRecord> = Vec::new();
        let mut push = |records: Vec<VendorRecord>, out: &mut Vec<VendorRecord>| {
            for r in records {
                if seen.insert(r.vendor_id) {
                    out.push(r);
                }
            }
        };

        if let Some(cued) = cue_parent_name(&mention.display_name) {
            push(self.registry.find_by_normalized_name(&cued)?, &mut out);
        }

        if let Some(domain) = &mention.domain {
            let mut rest = domain.as_str();
            while let Some((_, parent)) = rest.split_once('.') {
                if !parent.contains('.') {
                    break;
                }
                push(self.registry.get_by_domain(parent)?, &mut out);
                rest = parent;
            }
        }

        let tokens = &mention.name_tokens;
        for len in (1..tokens.len()).rev() {
            push(self.registry.find_by_normalized_name(&tokens[..len].join(" "))?, &mut out);
        }

        out.truncate(self.max_candidates);
        Ok(out)
    }

    /// Best positive judgement at or above the threshold.
    ///
    /// Collaborator failures on individual candidates are logged and skipped.
    pub fn propose(&self, mention: &NormalizedMention, vendor_id: VendorId) -> VendorResult<Option<SubsidiaryLink>> {
        let mut best: Option<(SubsidiaryLink, VendorRecord)> = None;
        for parent in self.parent_candidates(mention, vendor_id)? {
            let judgement = match self.collaborator.judge_subsidiary(mention, &parent) {
                Ok(j) => j,
                Err(err) => {
                    warn!(%vendor_id, parent = %parent.vendor_id, error = %err, "subsidiary judgement failed");
                    continue;
                }
            };
            if !judgement.is_subsidiary || !judgement.confidence.is_finite() || judgement.confidence < self.threshold - EPSILON {
                continue;
            }
            let better = match &best {
                None => true,
                Some((link, rec)) => {
                    judgement.confidence > link.confidence + EPSILON
                        || ((judgement.confidence - link.confidence).abs() <= EPSILON && parent.created_at < rec.created_at)
                }
            };
            if better {
                let link = SubsidiaryLink {
                    parent_vendor_id: parent.vendor_id,
                    confidence: judgement.confidence.clamp(0.0, 1.0),
                    justification: judgement.justification,
                };
                best = Some((link, parent));
            }
        }

        if let Some((link, _)) = &best {
            debug!(%vendor_id, parent = %link.parent_vendor_id, confidence = link.confidence, "subsidiary link proposed");
        }
        Ok(best.map(|(link, _)| link))
    }
}
