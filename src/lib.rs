//! # vendor-identity - Vendor Identity Resolution & Deduplication
//!
//! Decides, for every observed vendor mention, whether it refers to an
//! existing vendor, a new vendor, or an unresolved ambiguity, without ever
//! creating duplicate records, and non-destructively enriches matched
//! records with newly observed aliases, emails, domains and addresses.
//!
//! ## Pipeline
//!
//! - **Normalizer**: canonical names, tax ids, emails and domains
//! - **Key Index**: exact tax-id, domain and surrogate-key lookups
//! - **Similarity Matcher**: bounded candidate pool scored by an external collaborator
//! - **Verdict Arbiter**: pure, threshold-based MATCH / NEW_VENDOR / AMBIGUOUS
//! - **Merge Applier**: optimistic, idempotent set-union updates
//! - **Subsidiary Linker**: weak parent links, cycle-checked
//! - **Bulk Importer**: per-row isolation with deterministic surrogate ids
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use vendor_identity::{
//!     InMemoryVendorRegistry, LexicalCollaborator, ResolverConfig, Verdict, VendorMention,
//!     VendorResolver,
//! };
//!
//! let registry = Arc::new(InMemoryVendorRegistry::new());
//! let resolver = VendorResolver::new(
//!     registry,
//!     Arc::new(LexicalCollaborator::new()),
//!     ResolverConfig::default(),
//! )?;
//!
//! let first = resolver.resolve(&VendorMention::named("ACME GmbH").with_tax_id("DE123456789"))?;
//! assert_eq!(first.verdict, Verdict::NewVendor);
//!
//! let again = resolver.resolve(
//!     &VendorMention::named("Acme")
//!         .with_tax_id("DE 123 456 789")
//!         .with_email("billing@acme.de"),
//! )?;
//! assert_eq!(again.verdict, Verdict::Match);
//! assert_eq!(again.vendor_id, first.vendor_id);
//! # Ok::<(), vendor_identity::VendorError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod attribute;
pub mod error;
pub mod normalize;
pub mod result;
pub mod vendor;

// Registry
pub mod storage;

// Resolution pipeline
pub mod arbiter;
pub mod index;
pub mod inference;
pub mod merge;
pub mod resolver;
pub mod similarity;
pub mod subsidiary;

// Execution and bulk import
pub mod config;
pub mod import;
pub mod runtime;

// Re-export primary types at crate root for convenience
pub use attribute::{AttributeMap, AttributeValue};
pub use error::{ResolutionError, ValidationError, VendorError, VendorResult};
pub use normalize::{normalize_mention, NormalizedMention};
pub use result::{MatchMethod, MatchResult, RankedCandidate, SubsidiaryLink, Verdict};
pub use vendor::{AdditiveUpdate, SurrogateKey, VendorField, VendorId, VendorMention, VendorRecord};

pub use storage::{InMemoryVendorRegistry, StorageError, VendorRegistry};

pub use arbiter::{arbitrate, ArbiterDecision, SimilarityEvidence, Thresholds};
pub use index::{KeyEvidence, KeyIndex, MatchedKey};
pub use inference::{
    BoundedCollaborator, CandidateScore, InferenceCollaborator, LexicalCollaborator, SubsidiaryJudgement,
};
pub use merge::{LinkOutcome, MergeApplier, MergeOutcome};
pub use resolver::{ResolveOptions, VendorResolver};
pub use similarity::SimilarityMatcher;
pub use subsidiary::SubsidiaryLinker;

pub use config::{EngineConfig, ResolverConfig, RuntimeConfig};
pub use import::{BulkImportReport, BulkImporter, BulkRow, RowError, RowOutcome, RowStatus};
pub use runtime::{ResolutionHandle, ResolutionRuntime, ResolveRequest};
