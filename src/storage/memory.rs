//! In-memory registry backend.
//!
//! Thread-safe implementation of [`VendorRegistry`] used for embedded use,
//! tests, and as the reference for what a persistent backend must guarantee:
//! tax-id uniqueness checked under the same lock as the write, and
//! version-conditional, all-or-nothing additive updates.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::normalize::normalize_name;
use crate::storage::traits::{StorageError, VendorRegistry};
use crate::vendor::{AdditiveUpdate, SurrogateKey, VendorId, VendorRecord};

const MAX_PARENT_HOPS: usize = 1024;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct RegistryState {
    by_id: HashMap<VendorId, VendorRecord>,
    by_tax_id: HashMap<String, VendorId>,
    by_domain: HashMap<String, BTreeSet<VendorId>>,
    by_surrogate: HashMap<SurrogateKey, BTreeSet<VendorId>>,
    by_name: HashMap<String, BTreeSet<VendorId>>,
    by_token: HashMap<String, BTreeSet<VendorId>>,
}

impl RegistryState {
    /// Indexes every key of `record`. Indexes only grow because records only grow.
    fn index(&mut self, record: &VendorRecord) {
        let id = record.vendor_id;
        for tax_id in &record.tax_ids {
            self.by_tax_id.insert(tax_id.clone(), id);
        }
        for domain in &record.domains {
            self.by_domain.entry(domain.clone()).or_default().insert(id);
        }
        self.by_surrogate
            .entry(record.surrogate_key.clone())
            .or_default()
            .insert(id);

        let names = std::iter::once(record.normalized_name.clone())
            .chain(record.aliases.iter().filter_map(|a| normalize_name(a)));
        for name in names {
            for token in name.split(' ') {
                self.by_token.entry(token.to_string()).or_default().insert(id);
            }
            self.by_name.entry(name).or_default().insert(id);
        }
    }

    fn check_tax_ids<'a>(
        &self,
        id: VendorId,
        tax_ids: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), StorageError> {
        for tax_id in tax_ids {
            if let Some(owner) = self.by_tax_id.get(tax_id) {
                if *owner != id {
                    return Err(StorageError::TaxIdTaken {
                        tax_id: tax_id.clone(),
                        owner: *owner,
                    });
                }
            }
        }
        Ok(())
    }

    fn current(&self, id: VendorId, expected_version: u64) -> Result<&VendorRecord, StorageError> {
        let record = self.by_id.get(&id).ok_or(StorageError::VendorNotFound(id))?;
        if record.version != expected_version {
            return Err(StorageError::VersionConflict {
                id,
                expected: expected_version,
                actual: record.version,
            });
        }
        Ok(record)
    }

    fn collect(&self, ids: Option<&BTreeSet<VendorId>>) -> Vec<VendorRecord> {
        let mut records: Vec<VendorRecord> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.vendor_id.cmp(&b.vendor_id))
        });
        records
    }
}

/// Thread-safe in-memory vendor registry.
#[derive(Debug, Default)]
pub struct InMemoryVendorRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryVendorRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, oldest first.
    pub fn records(&self) -> Result<Vec<VendorRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("vendor.records"))?;
        let mut records: Vec<VendorRecord> = state.by_id.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.vendor_id.cmp(&b.vendor_id))
        });
        Ok(records)
    }
}

impl VendorRegistry for InMemoryVendorRegistry {
    fn create(&self, record: VendorRecord) -> Result<VendorId, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("vendor.create"))?;
        let id = record.vendor_id;
        if state.by_id.contains_key(&id) {
            return Err(StorageError::DuplicateKey(id.to_string()));
        }
        state.check_tax_ids(id, &record.tax_ids)?;

        state.index(&record);
        state.by_id.insert(id, record);
        Ok(id)
    }

    fn get(&self, id: VendorId) -> Result<Option<VendorRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("vendor.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn get_by_tax_id(&self, tax_id: &str) -> Result<Option<VendorRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("vendor.get_by_tax_id"))?;
        Ok(state
            .by_tax_id
            .get(tax_id)
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    fn get_by_domain(&self, domain: &str) -> Result<Vec<VendorRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("vendor.get_by_domain"))?;
        Ok(state.collect(state.by_domain.get(domain)))
    }

    fn get_by_surrogate_key(&self, key: &SurrogateKey) -> Result<Vec<VendorRecord>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("vendor.get_by_surrogate_key"))?;
        Ok(state.collect(state.by_surrogate.get(key)))
    }

    fn find_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<VendorRecord>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("vendor.find_by_normalized_name"))?;
        Ok(state.collect(state.by_name.get(normalized_name)))
    }

    fn find_by_name_tokens(&self, tokens: &[String], limit: usize) -> Result<Vec<VendorRecord>, StorageError> {
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("vendor.find_by_name_tokens"))?;

        let mut shared: HashMap<VendorId, usize> = HashMap::new();
        let unique: BTreeSet<&String> = tokens.iter().collect();
        for token in unique {
            for id in state.by_token.get(token.as_str()).into_iter().flatten() {
                *shared.entry(*id).or_default() += 1;
            }
        }

        let mut scored: Vec<(usize, &VendorRecord)> = shared
            .into_iter()
            .filter_map(|(id, n)| state.by_id.get(&id).map(|r| (n, r)))
            .collect();
        scored.sort_by(|(na, a), (nb, b)| {
            nb.cmp(na)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.vendor_id.cmp(&b.vendor_id))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn upsert_additive(
        &self,
        id: VendorId,
        expected_version: u64,
        updates: &[AdditiveUpdate],
    ) -> Result<VendorRecord, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("vendor.upsert_additive"))?;
        let current = state.current(id, expected_version)?;

        let new_tax_ids = updates.iter().filter_map(|u| match u {
            AdditiveUpdate::TaxId(t) => Some(t),
            _ => None,
        });
        state.check_tax_ids(id, new_tax_ids)?;

        let mut next = current.clone();
        let mut changed = false;
        for update in updates {
            changed |= next.apply(update);
        }
        if !changed {
            return Ok(next);
        }

        next.touch();
        state.index(&next);
        state.by_id.insert(id, next.clone());
        Ok(next)
    }

    fn set_parent(
        &self,
        id: VendorId,
        expected_version: u64,
        parent: VendorId,
    ) -> Result<VendorRecord, StorageError> {
        if id == parent {
            return Err(StorageError::ParentCycle { child: id, parent });
        }

        let mut state = self.state.write().map_err(|_| lock_err("vendor.set_parent"))?;
        let current = state.current(id, expected_version)?;
        if current.parent_vendor_id == Some(parent) {
            return Ok(current.clone());
        }
        if !state.by_id.contains_key(&parent) {
            return Err(StorageError::VendorNotFound(parent));
        }

        let mut cursor = Some(parent);
        let mut hops = 0usize;
        while let Some(ancestor) = cursor {
            if ancestor == id {
                return Err(StorageError::ParentCycle { child: id, parent });
            }
            hops += 1;
            if hops > MAX_PARENT_HOPS {
                return Err(StorageError::BackendError(
                    "parent chain resolution exceeded hop limit".to_string(),
                ));
            }
            cursor = state.by_id.get(&ancestor).and_then(|r| r.parent_vendor_id);
        }

        let mut next = current.clone();
        next.parent_vendor_id = Some(parent);
        next.touch();
        state.by_id.insert(id, next.clone());
        Ok(next)
    }

    fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("vendor.len"))?;
        Ok(state.by_id.len())
    }
}
