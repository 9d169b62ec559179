//! Self-healing merges.
//!
//! Folds newly observed values into a matched record with an optimistic
//! read / diff / conditional-write loop. Losing writers re-read and recompute
//! the difference, so concurrent contributions all survive.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::attribute::AttributeMap;
use crate::error::{ResolutionError, VendorError, VendorResult};
use crate::storage::{StorageError, VendorRegistry};
use crate::vendor::{AdditiveUpdate, VendorId, VendorRecord};

const MAX_CHAIN_HOPS: usize = 1024;

/// Result of a merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The record after the merge.
    pub record: VendorRecord,
    /// Updates actually written; empty if the record already held everything.
    pub applied: Vec<AdditiveUpdate>,
    /// Conditional writes attempted.
    pub attempts: u32,
}

/// Result of a parent-link attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The parent was set.
    Linked,
    /// The record already had this parent.
    AlreadyLinked,
    /// The record already has a different parent, which is never overwritten.
    KeptExisting(VendorId),
}

/// Applies additive updates and parent links under optimistic concurrency.
#[derive(Clone)]
pub struct MergeApplier {
    registry: Arc<dyn VendorRegistry>,
    max_attempts: u32,
    backoff: Duration,
}

impl MergeApplier {
    /// Applier retrying up to `max_attempts` times.
    pub fn new(registry: Arc<dyn VendorRegistry>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            registry,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    fn load(&self, id: VendorId) -> VendorResult<VendorRecord> {
        self.registry
            .get(id)?
            .ok_or_else(|| ResolutionError::VendorNotFound { id }.into())
    }

    fn pause(&self, attempt: u32) {
        if !self.backoff.is_zero() {
            thread::sleep(self.backoff.saturating_mul(1 << attempt.min(16)));
        }
    }

    /// Append the values of `updates` that `vendor_id` does not hold yet.
    ///
    /// Custom attributes are only offered when `source_system` owns the
    /// record, and never replace an existing key.
    ///
    /// # Errors
    /// - `MergeConflict` after `max_attempts` lost races.
    /// - `KeyConflict` if an added tax id belongs to another vendor.
    pub fn apply(
        &self,
        vendor_id: VendorId,
        updates: &[AdditiveUpdate],
        custom_attributes: &AttributeMap,
        source_system: &str,
    ) -> VendorResult<MergeOutcome> {
        for attempt in 0..self.max_attempts {
            let current = self.load(vendor_id)?;

            let mut offered: Vec<AdditiveUpdate> = updates.to_vec();
            if current.source_system == source_system {
                offered.extend(custom_attributes.iter().map(|(key, value)| AdditiveUpdate::CustomAttribute {
                    key: key.clone(),
                    value: value.clone(),
                }));
            }
            let novel = novel_updates(&current, &offered);
            if novel.is_empty() {
                return Ok(MergeOutcome {
                    record: current,
                    applied: Vec::new(),
                    attempts: attempt,
                });
            }

            match self.registry.upsert_additive(vendor_id, current.version, &novel) {
                Ok(record) => {
                    debug!(%vendor_id, version = record.version, applied = novel.len(), "merged additive updates");
                    return Ok(MergeOutcome {
                        record,
                        applied: novel,
                        attempts: attempt + 1,
                    });
                }
                Err(StorageError::VersionConflict { expected, actual, .. }) => {
                    debug!(%vendor_id, expected, actual, attempt = attempt + 1, "merge lost race, retrying");
                    self.pause(attempt);
                }
                Err(StorageError::TaxIdTaken { tax_id, owner }) => {
                    return Err(ResolutionError::KeyConflict {
                        key: format!("tax_id:{tax_id}"),
                        vendors: vec![owner, vendor_id],
                    }
                    .into());
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(%vendor_id, attempts = self.max_attempts, "merge gave up after repeated version conflicts");
        Err(ResolutionError::MergeConflict {
            vendor_id,
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Set `parent` as the parent of `child` unless it already has one.
    ///
    /// # Errors
    /// - `CycleDetected` if `parent`'s chain reaches `child`.
    /// - `MergeConflict` after `max_attempts` lost races.
    pub fn link_parent(&self, child: VendorId, parent: VendorId) -> VendorResult<LinkOutcome> {
        for attempt in 0..self.max_attempts {
            let current = self.load(child)?;
            match current.parent_vendor_id {
                Some(existing) if existing == parent => return Ok(LinkOutcome::AlreadyLinked),
                Some(existing) => return Ok(LinkOutcome::KeptExisting(existing)),
                None => {}
            }
            self.check_chain(child, parent)?;

            match self.registry.set_parent(child, current.version, parent) {
                Ok(_) => {
                    debug!(%child, %parent, "linked subsidiary to parent");
                    return Ok(LinkOutcome::Linked);
                }
                Err(StorageError::VersionConflict { .. }) => self.pause(attempt),
                Err(StorageError::ParentCycle { child, parent }) => {
                    return Err(ResolutionError::CycleDetected { child, parent }.into());
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(ResolutionError::MergeConflict {
            vendor_id: child,
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Walks the parent chain upward from `parent`, failing if it reaches `child`.
    fn check_chain(&self, child: VendorId, parent: VendorId) -> VendorResult<()> {
        let mut cursor = Some(parent);
        let mut hops = 0usize;
        while let Some(id) = cursor {
            if id == child {
                return Err(ResolutionError::CycleDetected { child, parent }.into());
            }
            hops += 1;
            if hops > MAX_CHAIN_HOPS {
                return Err(VendorError::internal("parent chain exceeds hop limit"));
            }
            cursor = self.registry.get(id)?.and_then(|r| r.parent_vendor_id);
        }
        Ok(())
    }
}

/// The subset of `offered` that would change `record`, in order, without repeats.
fn novel_updates(record: &VendorRecord, offered: &[AdditiveUpdate]) -> Vec<AdditiveUpdate> {
    let mut scratch = record.clone();
    offered
        .iter()
        .filter(|u| scratch.apply(u))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeValue;
    use crate::normalize::normalize_mention;
    use crate::storage::InMemoryVendorRegistry;
    use crate::vendor::VendorMention;

    fn setup() -> (Arc<InMemoryVendorRegistry>, MergeApplier) {
        let registry = Arc::new(InMemoryVendorRegistry::new());
        let merger = MergeApplier::new(registry.clone(), 8, Duration::from_millis(1));
        (registry, merger)
    }

    fn insert(registry: &InMemoryVendorRegistry, mention: VendorMention, source: &str) -> VendorId {
        let n = normalize_mention(&mention).unwrap();
        registry.create(VendorRecord::from_mention(VendorId::new(), &n, source)).unwrap()
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (registry, merger) = setup();
        let id = insert(&registry, VendorMention::named("ACME GmbH").with_tax_id("DE123456789"), "invoice");

        let mention = normalize_mention(
            &VendorMention::named("ACME GmbH")
                .with_tax_id("DE123456789")
                .with_email("billing@acme.de"),
        )
        .unwrap();
        let updates = mention.additive_updates();

        let first = merger.apply(id, &updates, &AttributeMap::new(), "invoice").unwrap();
        assert_eq!(
            first.applied,
            vec![
                AdditiveUpdate::Email("billing@acme.de".to_string()),
                AdditiveUpdate::Domain("acme.de".to_string())
            ]
        );

        let second = merger.apply(id, &updates, &AttributeMap::new(), "invoice").unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.record.version, first.record.version);
        assert_eq!(second.record.emails, first.record.emails);
    }

    #[test]
    fn test_custom_attributes_only_for_owning_source() {
        let (registry, merger) = setup();
        let id = insert(&registry, VendorMention::named("Globex"), "sap");

        let mut attrs = AttributeMap::new();
        attrs.insert("payment_terms".to_string(), AttributeValue::from("NET30"));

        let foreign = merger.apply(id, &[], &attrs, "netsuite").unwrap();
        assert!(foreign.applied.is_empty());

        let owned = merger.apply(id, &[], &attrs, "sap").unwrap();
        assert_eq!(owned.applied.len(), 1);
        assert_eq!(owned.record.custom_attributes["payment_terms"], AttributeValue::from("NET30"));
    }

    #[test]
    fn test_tax_id_owned_elsewhere_is_key_conflict() {
        let (registry, merger) = setup();
        insert(&registry, VendorMention::named("Owner").with_tax_id("DE111111111"), "t");
        let id = insert(&registry, VendorMention::named("Other"), "t");

        let err = merger
            .apply(id, &[AdditiveUpdate::TaxId("DE111111111".to_string())], &AttributeMap::new(), "t")
            .unwrap_err();
        assert!(matches!(err, VendorError::Resolution(ResolutionError::KeyConflict { .. })));
    }

    #[test]
    fn test_link_parent_and_keep_existing() {
        let (registry, merger) = setup();
        let parent = insert(&registry, VendorMention::named("Acme Holdings"), "t");
        let other = insert(&registry, VendorMention::named("Globex"), "t");
        let child = insert(&registry, VendorMention::named("Acme Logistics"), "t");

        assert_eq!(merger.link_parent(child, parent).unwrap(), LinkOutcome::Linked);
        assert_eq!(merger.link_parent(child, parent).unwrap(), LinkOutcome::AlreadyLinked);
        assert_eq!(merger.link_parent(child, other).unwrap(), LinkOutcome::KeptExisting(parent));
        assert_eq!(registry.get(child).unwrap().unwrap().parent_vendor_id, Some(parent));
    }

    #[test]
    fn test_link_parent_rejects_cycle() {
        let (registry, merger) = setup();
        let a = insert(&registry, VendorMention::named("A"), "t");
        let b = insert(&registry, VendorMention::named("B"), "t");
        merger.link_parent(b, a).unwrap();

        let err = merger.link_parent(a, b).unwrap_err();
        assert!(matches!(err, VendorError::Resolution(ResolutionError::CycleDetected { .. })));
        assert_eq!(registry.get(a).unwrap().unwrap().parent_vendor_id, None);
    }

    #[test]
    fn test_missing_vendor() {
        let (_registry, merger) = setup();
        let err = merger.apply(VendorId::new(), &[], &AttributeMap::new(), "t").unwrap_err();
        assert!(matches!(err, VendorError::Resolution(ResolutionError::VendorNotFound { .. })));
    }
}
