//! Single-mention resolution pipeline.
//!
//! normalize → key lookup → similarity → arbitration → merge, create or
//! leave for review, then an optional subsidiary link.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::arbiter::{arbitrate, ArbiterDecision, SimilarityEvidence};
use crate::attribute::AttributeMap;
use crate::config::ResolverConfig;
use crate::error::{ResolutionError, VendorError, VendorResult};
use crate::import::BulkRow;
use crate::index::{KeyEvidence, KeyIndex};
use crate::inference::{BoundedCollaborator, InferenceCollaborator};
use crate::merge::{LinkOutcome, MergeApplier};
use crate::normalize::{normalize_mention, NormalizedMention};
use crate::result::{MatchMethod, MatchResult, RankedCandidate, SubsidiaryLink, Verdict};
use crate::similarity::SimilarityMatcher;
use crate::storage::{StorageError, VendorRegistry};
use crate::subsidiary::SubsidiaryLinker;
use crate::vendor::{AdditiveUpdate, VendorId, VendorMention, VendorRecord};

/// Source tag for records created from single mentions.
pub const DEFAULT_SOURCE_SYSTEM: &str = "mention";

/// Lost creation races tolerated before giving up.
const CREATE_ATTEMPTS: u32 = 3;

/// Per-call options.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Create new records under the id derived from the surrogate key, and
    /// treat the surrogate key as a lookup key.
    pub deterministic_id: bool,
    /// Source-owned attributes offered to the record.
    pub custom_attributes: AttributeMap,
    /// System the mention came from.
    pub source_system: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            deterministic_id: false,
            custom_attributes: AttributeMap::new(),
            source_system: DEFAULT_SOURCE_SYSTEM.to_string(),
        }
    }
}

impl ResolveOptions {
    /// Options for one bulk-import row.
    #[must_use]
    pub fn for_import(custom_attributes: AttributeMap, source_system: impl Into<String>) -> Self {
        Self {
            deterministic_id: true,
            custom_attributes,
            source_system: source_system.into(),
        }
    }
}

/// Resolves vendor mentions against a shared registry.
///
/// Cheap to share across threads behind an `Arc`; every call is an
/// independent unit of work.
pub struct VendorResolver {
    registry: Arc<dyn VendorRegistry>,
    config: ResolverConfig,
    keys: KeyIndex,
    similarity: SimilarityMatcher,
    merger: MergeApplier,
    linker: SubsidiaryLinker,
}

impl VendorResolver {
    /// Build a resolver. The collaborator is wrapped with the configured
    /// timeout and retry policy.
    ///
    /// # Errors
    /// - `Validation` if `config` is invalid.
    /// - `CollaboratorUnavailable` if the collaborator workers cannot start.
    pub fn new(
        registry: Arc<dyn VendorRegistry>,
        collaborator: Arc<dyn InferenceCollaborator>,
        config: ResolverConfig,
    ) -> VendorResult<Self> {
        config.validate()?;
        let bounded: Arc<dyn InferenceCollaborator> = Arc::new(
            BoundedCollaborator::spawn(
                collaborator,
                config.collaborator_timeout(),
                config.collaborator_workers,
                config.collaborator_queue_capacity,
            )?
            .with_retries(config.collaborator_attempts, config.retry_backoff()),
        );
        Ok(Self {
            keys: KeyIndex::new(Arc::clone(&registry)),
            similarity: SimilarityMatcher::new(
                Arc::clone(&registry),
                Arc::clone(&bounded),
                config.top_k,
                config.candidate_pool_size,
            ),
            merger: MergeApplier::new(Arc::clone(&registry), config.max_merge_attempts, config.retry_backoff()),
            linker: SubsidiaryLinker::new(
                Arc::clone(&registry),
                bounded,
                config.subsidiary_threshold,
                config.candidate_pool_size,
            ),
            registry,
            config,
        })
    }

    /// The backing registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn VendorRegistry> {
        &self.registry
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve one mention with default options.
    ///
    /// # Errors
    /// - `Validation` for malformed mentions.
    /// - `MergeConflict` if the matched record kept changing underneath.
    /// - `KeyConflict` if every creation attempt found the tax id taken by
    ///   a record the key lookup could not see.
    /// - `Storage` for registry failures.
    pub fn resolve(&self, mention: &VendorMention) -> VendorResult<MatchResult> {
        self.resolve_with(mention, &ResolveOptions::default())
    }

    /// Resolve one bulk-import row.
    pub fn resolve_import_row(&self, row: &BulkRow) -> VendorResult<MatchResult> {
        let options = ResolveOptions::for_import(row.custom_attributes.clone(), row.source_system.clone());
        self.resolve_with(&row.mention, &options)
    }

    /// Resolve one mention.
    pub fn resolve_with(&self, mention: &VendorMention, options: &ResolveOptions) -> VendorResult<MatchResult> {
        let normalized = normalize_mention(mention)?;
        let surrogate = options.deterministic_id.then(|| normalized.surrogate_key());
        let mut lost_race: Option<(VendorId, StorageError)> = None;

        for attempt in 0..CREATE_ATTEMPTS {
            let key = self.keys.lookup(&normalized, surrogate.as_ref())?;
            let similarity = if key.is_none() {
                self.similarity.evidence(&normalized)?
            } else {
                SimilarityEvidence::NotRun
            };
            let decision = arbitrate(&self.config.thresholds(), &key, &similarity);
            let candidates = match similarity {
                SimilarityEvidence::Ranked(ranked) => ranked,
                _ => Vec::new(),
            };
            debug!(
                name = %normalized.normalized_name,
                verdict = %decision.verdict,
                method = %decision.method,
                confidence = decision.confidence,
                "arbitrated"
            );

            match decision.verdict {
                Verdict::Ambiguous => {
                    if let KeyEvidence::Conflict { key, vendors } = &key {
                        warn!(%key, vendors = vendors.len(), "key conflict left for review");
                    }
                    return Ok(result_from(decision, candidates));
                }
                Verdict::Match => return self.on_match(&normalized, options, decision, candidates),
                Verdict::NewVendor => {
                    let id = surrogate.as_ref().map_or_else(VendorId::new, |k| k.vendor_id());
                    match self.create(id, &normalized, options) {
                        Ok(record) => return self.on_created(&normalized, record, decision, candidates),
                        Err(err @ (StorageError::TaxIdTaken { .. } | StorageError::DuplicateKey(_))) => {
                            debug!(vendor_id = %id, attempt = attempt + 1, error = %err, "lost creation race, re-resolving");
                            lost_race = Some((id, err));
                        }
                        Err(other) => return Err(other.into()),
                    }
                }
            }
        }

        // Every attempt lost a creation race; report what was contested.
        let err = match lost_race {
            Some((_, StorageError::TaxIdTaken { tax_id, owner })) => ResolutionError::KeyConflict {
                key: format!("tax_id:{tax_id}"),
                vendors: vec![owner],
            },
            Some((vendor_id, _)) => ResolutionError::MergeConflict {
                vendor_id,
                attempts: CREATE_ATTEMPTS,
            },
            None => return Err(VendorError::internal("creation retries ended without a creation attempt")),
        };
        Err(err.into())
    }

    fn create(
        &self,
        id: VendorId,
        normalized: &NormalizedMention,
        options: &ResolveOptions,
    ) -> Result<VendorRecord, StorageError> {
        let mut record = VendorRecord::from_mention(id, normalized, options.source_system.as_str());
        for (key, value) in &options.custom_attributes {
            record.apply(&AdditiveUpdate::CustomAttribute {
                key: key.clone(),
                value: value.clone(),
            });
        }
        self.registry.create(record.clone())?;
        Ok(record)
    }

    fn on_match(
        &self,
        normalized: &NormalizedMention,
        options: &ResolveOptions,
        decision: ArbiterDecision,
        candidates: Vec<RankedCandidate>,
    ) -> VendorResult<MatchResult> {
        let Some(vendor_id) = decision.vendor_id else {
            return Err(VendorError::internal("match decision without vendor id"));
        };

        let outcome = match self.merger.apply(
            vendor_id,
            &normalized.additive_updates(),
            &options.custom_attributes,
            &options.source_system,
        ) {
            Ok(outcome) => outcome,
            Err(VendorError::Resolution(ResolutionError::KeyConflict { key, vendors })) => {
                warn!(%vendor_id, %key, "merge would steal a tax id, leaving for review");
                let ids: Vec<String> = vendors.iter().map(ToString::to_string).collect();
                return Ok(MatchResult {
                    verdict: Verdict::Ambiguous,
                    vendor_id: None,
                    confidence: decision.confidence,
                    method: decision.method,
                    reasoning: format!(
                        "{}; merge rejected: {key} already held by [{}]",
                        decision.reasoning,
                        ids.join(", ")
                    ),
                    candidates,
                    database_updates: Vec::new(),
                    subsidiary_link: None,
                    created: false,
                });
            }
            Err(err) => return Err(err),
        };

        let subsidiary_link = if decision.method == MatchMethod::SimilarityMatch
            && decision.confidence < self.config.subsidiary_check_below
        {
            self.link_subsidiary(normalized, vendor_id)?
        } else {
            None
        };

        let mut result = result_from(decision, candidates);
        result.database_updates = outcome.applied;
        result.subsidiary_link = subsidiary_link;
        Ok(result)
    }

    fn on_created(
        &self,
        normalized: &NormalizedMention,
        record: VendorRecord,
        decision: ArbiterDecision,
        candidates: Vec<RankedCandidate>,
    ) -> VendorResult<MatchResult> {
        info!(
            vendor_id = %record.vendor_id,
            name = %record.canonical_name,
            source_system = %record.source_system,
            "created vendor"
        );
        let subsidiary_link = self.link_subsidiary(normalized, record.vendor_id)?;

        let mut result = result_from(decision, candidates);
        result.vendor_id = Some(record.vendor_id);
        result.created = true;
        result.subsidiary_link = subsidiary_link;
        Ok(result)
    }

    /// Proposes and applies a parent link. Links that cannot be applied are dropped.
    fn link_subsidiary(&self, normalized: &NormalizedMention, vendor_id: VendorId) -> VendorResult<Option<SubsidiaryLink>> {
        let Some(link) = self.linker.propose(normalized, vendor_id)? else {
            return Ok(None);
        };
        match self.merger.link_parent(vendor_id, link.parent_vendor_id) {
            Ok(LinkOutcome::Linked | LinkOutcome::AlreadyLinked) => Ok(Some(link)),
            Ok(LinkOutcome::KeptExisting(existing)) => {
                debug!(%vendor_id, %existing, proposed = %link.parent_vendor_id, "vendor already has a parent");
                Ok(None)
            }
            Err(VendorError::Resolution(err)) => {
                warn!(%vendor_id, parent = %link.parent_vendor_id, error = %err, "subsidiary link dropped");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

fn result_from(decision: ArbiterDecision, candidates: Vec<RankedCandidate>) -> MatchResult {
    MatchResult {
        verdict: decision.verdict,
        vendor_id: decision.vendor_id,
        confidence: decision.confidence,
        method: decision.method,
        reasoning: decision.reasoning,
        candidates,
        database_updates: Vec::new(),
        subsidiary_link: None,
        created: false,
    }
}
