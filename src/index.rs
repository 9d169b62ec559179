//! Deterministic key lookup.
//!
//! Exact-match resolution over uniqueness-enforced identifiers. A tax-id hit
//! is authoritative and short-circuits similarity matching; domain and
//! surrogate-key hits follow.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::normalize::NormalizedMention;
use crate::storage::{StorageError, VendorRegistry};
use crate::vendor::{SurrogateKey, VendorId, VendorRecord};

/// The identifier that produced a key match or conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MatchedKey {
    /// Normalized tax id.
    TaxId(String),
    /// Email domain.
    Domain(String),
    /// Bulk-import surrogate key.
    SurrogateKey(SurrogateKey),
}

impl fmt::Display for MatchedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaxId(v) => write!(f, "tax_id:{v}"),
            Self::Domain(v) => write!(f, "domain:{v}"),
            Self::SurrogateKey(v) => write!(f, "surrogate_key:{v}"),
        }
    }
}

/// Outcome of a key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvidence {
    /// Exactly one vendor owns the key.
    Match {
        /// Owner of the key.
        vendor_id: VendorId,
        /// The key that matched.
        key: MatchedKey,
    },
    /// The key points at several vendors, or at a vendor other than the expected one.
    Conflict {
        /// The contested key.
        key: MatchedKey,
        /// Every vendor holding it.
        vendors: Vec<VendorId>,
    },
    /// No key matched.
    None,
}

impl KeyEvidence {
    /// True if no key matched or conflicted.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Exact-match lookups against the registry's hash indexes.
#[derive(Clone)]
pub struct KeyIndex {
    registry: Arc<dyn VendorRegistry>,
}

impl KeyIndex {
    /// Create a key index over `registry`.
    pub fn new(registry: Arc<dyn VendorRegistry>) -> Self {
        Self { registry }
    }

    /// Vendor owning a normalized tax id.
    pub fn lookup_by_tax_id(&self, tax_id: &str) -> Result<Option<VendorId>, StorageError> {
        Ok(self.registry.get_by_tax_id(tax_id)?.map(|r| r.vendor_id))
    }

    /// Vendor owning a domain, if exactly one does.
    pub fn lookup_by_domain(&self, domain: &str) -> Result<Option<VendorId>, StorageError> {
        let owners = self.registry.get_by_domain(domain)?;
        Ok(match owners.as_slice() {
            [only] => Some(only.vendor_id),
            _ => None,
        })
    }

    /// Resolves a surrogate key against the deterministic id it implies.
    ///
    /// A record carrying the key under that id is a match (an earlier run of
    /// the same import). Records carrying the key under other ids conflict.
    pub fn lookup_by_surrogate_key(&self, key: &SurrogateKey) -> Result<KeyEvidence, StorageError> {
        let expected = key.vendor_id();
        let holders = self.registry.get_by_surrogate_key(key)?;
        if holders.iter().any(|r| r.vendor_id == expected) {
            return Ok(KeyEvidence::Match {
                vendor_id: expected,
                key: MatchedKey::SurrogateKey(key.clone()),
            });
        }
        if holders.is_empty() {
            return Ok(KeyEvidence::None);
        }
        Ok(KeyEvidence::Conflict {
            key: MatchedKey::SurrogateKey(key.clone()),
            vendors: holders.iter().map(|r| r.vendor_id).collect(),
        })
    }

    /// Full key lookup for a mention: tax id, then surrogate key (when
    /// given), then domain.
    pub fn lookup(
        &self,
        mention: &NormalizedMention,
        surrogate: Option<&SurrogateKey>,
    ) -> Result<KeyEvidence, StorageError> {
        if let Some(tax_id) = &mention.tax_id {
            if let Some(vendor_id) = self.lookup_by_tax_id(tax_id)? {
                return Ok(KeyEvidence::Match {
                    vendor_id,
                    key: MatchedKey::TaxId(tax_id.clone()),
                });
            }
        }

        if let Some(key) = surrogate {
            let evidence = self.lookup_by_surrogate_key(key)?;
            if !evidence.is_none() {
                return Ok(evidence);
            }
        }

        if let Some(domain) = &mention.domain {
            let owners: Vec<VendorRecord> = self
                .registry
                .get_by_domain(domain)?
                .into_iter()
                .filter(|owner| tax_id_compatible(owner, mention.tax_id.as_deref()))
                .collect();
            match owners.as_slice() {
                [] => {}
                [owner] => {
                    return Ok(KeyEvidence::Match {
                        vendor_id: owner.vendor_id,
                        key: MatchedKey::Domain(domain.clone()),
                    })
                }
                _ => {
                    return Ok(KeyEvidence::Conflict {
                        key: MatchedKey::Domain(domain.clone()),
                        vendors: owners.iter().map(|r| r.vendor_id).collect(),
                    })
                }
            }
        }

        Ok(KeyEvidence::None)
    }
}

/// False if the record and the mention carry tax ids that disagree.
///
/// Disagreeing tax ids mean different legal entities, so neither a shared
/// domain nor a similar name may identify the record.
pub(crate) fn tax_id_compatible(record: &VendorRecord, tax_id: Option<&str>) -> bool {
    match tax_id {
        None => true,
        Some(t) => record.tax_ids.is_empty() || record.tax_ids.contains(t),
    }
}
