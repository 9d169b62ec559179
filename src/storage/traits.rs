//! Abstract registry contract.
//!
//! The vendor registry is an external persistence collaborator. The engine
//! only talks to it through [`VendorRegistry`], which keeps the resolution
//! logic independent of the storage engine and lets tests run against the
//! in-memory backend.

use thiserror::Error;

use crate::vendor::{AdditiveUpdate, SurrogateKey, VendorId, VendorRecord};

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Vendor not found.
    #[error("Vendor not found: {0}")]
    VendorNotFound(VendorId),

    /// A record with this id already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The tax id is already registered to another vendor.
    #[error("Tax id {tax_id} already belongs to vendor {owner}")]
    TaxIdTaken {
        /// The contested tax id.
        tax_id: String,
        /// Current owner.
        owner: VendorId,
    },

    /// Conditional write rejected because the record changed underneath.
    #[error("Version conflict on vendor {id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Vendor being written.
        id: VendorId,
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// Setting the parent would close a loop in the parent chain.
    #[error("Parent link {child} -> {parent} would create a cycle")]
    ParentCycle {
        /// Record receiving the parent.
        child: VendorId,
        /// Proposed parent.
        parent: VendorId,
    },

    /// Backend error.
    #[error("Registry backend error: {0}")]
    BackendError(String),
}

/// Storage trait for vendor records.
///
/// # Safety Considerations
/// - `create` must check tax-id ownership atomically with the insert.
/// - `upsert_additive` and `set_parent` are conditional on `expected_version`
///   and must apply all-or-nothing.
/// - Implementations must handle concurrent access safely.
pub trait VendorRegistry: Send + Sync {
    /// Insert a new record.
    ///
    /// # Errors
    /// - `DuplicateKey` if the id exists.
    /// - `TaxIdTaken` if any of its tax ids belongs to another vendor.
    fn create(&self, record: VendorRecord) -> Result<VendorId, StorageError>;

    /// Get a record by id.
    fn get(&self, id: VendorId) -> Result<Option<VendorRecord>, StorageError>;

    /// Get the record owning a normalized tax id.
    fn get_by_tax_id(&self, tax_id: &str) -> Result<Option<VendorRecord>, StorageError>;

    /// Get all records listing a domain.
    fn get_by_domain(&self, domain: &str) -> Result<Vec<VendorRecord>, StorageError>;

    /// Get all records carrying a surrogate key.
    fn get_by_surrogate_key(&self, key: &SurrogateKey) -> Result<Vec<VendorRecord>, StorageError>;

    /// Find records whose normalized name or normalized alias equals `normalized_name`.
    fn find_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<VendorRecord>, StorageError>;

    /// Find records sharing at least one normalized name token (canonical or alias).
    ///
    /// Results are ordered by descending number of shared tokens, then by
    /// `created_at`, and truncated to `limit`.
    fn find_by_name_tokens(&self, tokens: &[String], limit: usize) -> Result<Vec<VendorRecord>, StorageError>;

    /// Apply additive updates with set-union semantics, all-or-nothing.
    ///
    /// # Errors
    /// - `VersionConflict` if the stored version differs from `expected_version`.
    /// - `TaxIdTaken` if an added tax id belongs to another vendor.
    fn upsert_additive(
        &self,
        id: VendorId,
        expected_version: u64,
        updates: &[AdditiveUpdate],
    ) -> Result<VendorRecord, StorageError>;

    /// Set `parent_vendor_id`, rejecting cycles.
    ///
    /// # Errors
    /// - `VersionConflict` as for `upsert_additive`.
    /// - `ParentCycle` if `parent`'s chain reaches `id`.
    fn set_parent(
        &self,
        id: VendorId,
        expected_version: u64,
        parent: VendorId,
    ) -> Result<VendorRecord, StorageError>;

    /// Number of stored records.
    fn len(&self) -> Result<usize, StorageError>;

    /// True if the registry holds no records.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}
