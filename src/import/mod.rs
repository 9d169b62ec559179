//! Bulk dedup import.
//!
//! Each row runs through the single-mention pipeline as an independent unit
//! on the resolution runtime. New records get deterministic ids derived from
//! their surrogate key, so re-running an interrupted batch converges on the
//! same registry state. Row failures are collected, never fatal.

mod csv_feed;

use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::attribute::{AttributeMap, AttributeValue};
use crate::config::RuntimeConfig;
use crate::error::VendorResult;
use crate::resolver::VendorResolver;
use crate::result::{MatchResult, Verdict};
use crate::runtime::{ResolutionRuntime, ResolveRequest};
use crate::vendor::{VendorId, VendorMention};

/// One row of a bulk feed, already mapped onto mention fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRow {
    /// The mention fields of the row.
    pub mention: VendorMention,
    /// Non-standard columns of the source feed.
    #[serde(default)]
    pub custom_attributes: AttributeMap,
    /// Feed the row came from; owns the custom attributes of records it creates.
    pub source_system: String,
}

impl BulkRow {
    /// Row without custom attributes.
    pub fn new(mention: VendorMention, source_system: impl Into<String>) -> Self {
        Self {
            mention,
            custom_attributes: AttributeMap::new(),
            source_system: source_system.into(),
        }
    }

    /// Adds a custom attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }
}

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// A new record was created.
    Inserted,
    /// An existing record gained values or a parent link.
    Updated,
    /// Matched without new data, or left for review.
    Skipped,
    /// The row raised an error.
    Failed,
}

/// Per-row result, for review queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    /// 0-based index into the batch.
    pub row_index: usize,
    /// What happened.
    pub status: RowStatus,
    /// Verdict, absent for failed rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    /// Affected vendor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<VendorId>,
}

/// A row that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 0-based index into the batch.
    pub row_index: usize,
    /// Error description.
    pub message: String,
}

/// Summary of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkImportReport {
    /// Rows that created a vendor.
    pub inserted_count: usize,
    /// Rows that enriched an existing vendor.
    pub updated_count: usize,
    /// Rows that changed nothing.
    pub skipped_count: usize,
    /// Failed rows, by index.
    pub errors: Vec<RowError>,
    /// One outcome per row, by index.
    pub outcomes: Vec<RowOutcome>,
}

impl BulkImportReport {
    /// Rows that completed without error.
    #[must_use]
    pub const fn succeeded(&self) -> usize {
        self.inserted_count + self.updated_count + self.skipped_count
    }

    fn record(&mut self, row_index: usize, result: VendorResult<MatchResult>) {
        let (status, verdict, vendor_id) = match result {
            Ok(r) => {
                let status = match r.verdict {
                    Verdict::NewVendor if r.created => RowStatus::Inserted,
                    Verdict::Match if !r.database_updates.is_empty() || r.subsidiary_link.is_some() => {
                        RowStatus::Updated
                    }
                    _ => RowStatus::Skipped,
                };
                (status, Some(r.verdict), r.vendor_id)
            }
            Err(err) => {
                self.fail(row_index, err.to_string());
                return;
            }
        };
        match status {
            RowStatus::Inserted => self.inserted_count += 1,
            RowStatus::Updated => self.updated_count += 1,
            RowStatus::Skipped => self.skipped_count += 1,
            RowStatus::Failed => {}
        }
        self.outcomes.push(RowOutcome {
            row_index,
            status,
            verdict,
            vendor_id,
        });
    }

    fn fail(&mut self, row_index: usize, message: String) {
        self.errors.push(RowError { row_index, message });
        self.outcomes.push(RowOutcome {
            row_index,
            status: RowStatus::Failed,
            verdict: None,
            vendor_id: None,
        });
    }
}

/// Drives batches of rows through the resolution runtime.
pub struct BulkImporter {
    runtime: ResolutionRuntime,
}

impl BulkImporter {
    /// Start an importer with its own worker pool.
    pub fn new(resolver: Arc<VendorResolver>, config: &RuntimeConfig) -> VendorResult<Self> {
        Ok(Self::from_runtime(ResolutionRuntime::new(resolver, config)?))
    }

    /// Importer over an existing runtime.
    #[must_use]
    pub fn from_runtime(runtime: ResolutionRuntime) -> Self {
        Self { runtime }
    }

    /// The underlying runtime.
    #[must_use]
    pub const fn runtime(&self) -> &ResolutionRuntime {
        &self.runtime
    }

    /// Import a batch. Always completes; row failures land in `errors`.
    pub fn import(&self, rows: Vec<BulkRow>) -> BulkImportReport {
        self.import_indexed(rows.into_iter().enumerate().collect(), Vec::new())
    }

    /// Import a CSV feed with a header row.
    ///
    /// Known columns map onto mention fields; every other non-empty column
    /// becomes a custom attribute. Malformed records are row errors.
    ///
    /// # Errors
    /// `Validation` if the header is unreadable or lacks a name column.
    pub fn import_csv<R: Read>(&self, reader: R, source_system: &str) -> VendorResult<BulkImportReport> {
        let (rows, errors) = csv_feed::read_rows(reader, source_system)?;
        Ok(self.import_indexed(rows, errors))
    }

    fn import_indexed(&self, rows: Vec<(usize, BulkRow)>, parse_errors: Vec<RowError>) -> BulkImportReport {
        let total = rows.len() + parse_errors.len();
        let mut report = BulkImportReport::default();
        for e in parse_errors {
            report.fail(e.row_index, e.message);
        }

        let pending: Vec<_> = rows
            .into_iter()
            .map(|(idx, row)| (idx, self.runtime.submit_blocking(ResolveRequest::ImportRow(row))))
            .collect();
        for (idx, handle) in pending {
            report.record(idx, handle.and_then(|h| h.join()));
        }

        report.errors.sort_by_key(|e| e.row_index);
        report.outcomes.sort_by_key(|o| o.row_index);
        info!(
            rows = total,
            inserted = report.inserted_count,
            updated = report.updated_count,
            skipped = report.skipped_count,
            errors = report.errors.len(),
            "bulk import finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::inference::LexicalCollaborator;
    use crate::storage::InMemoryVendorRegistry;
    use crate::storage::VendorRegistry;

    fn importer() -> (Arc<InMemoryVendorRegistry>, BulkImporter) {
        let registry = Arc::new(InMemoryVendorRegistry::new());
        let resolver = VendorResolver::new(
            registry.clone(),
            Arc::new(LexicalCollaborator::new()),
            ResolverConfig::default(),
        )
        .unwrap();
        let importer = BulkImporter::new(Arc::new(resolver), &RuntimeConfig::default()).unwrap();
        (registry, importer)
    }

    #[test]
    fn test_counts_and_row_errors() {
        let (registry, importer) = importer();
        let rows = vec![
            BulkRow::new(VendorMention::named("Acme GmbH").with_tax_id("DE123456789"), "erp"),
            BulkRow::new(VendorMention::named(""), "erp"),
            BulkRow::new(VendorMention::named("Initech").with_tax_id("x"), "erp"),
        ];
        let report = importer.import(rows);
        assert_eq!(report.inserted_count, 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].row_index, 1);
        assert_eq!(report.errors[1].row_index, 2);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let (registry, importer) = importer();
        let rows = vec![
            BulkRow::new(VendorMention::named("Globex").with_email("ap@globex.com"), "erp").with_attribute("terms", "NET30"),
            BulkRow::new(VendorMention::named("Umbrella").with_tax_id("GB999999999"), "erp"),
        ];
        let first = importer.import(rows.clone());
        assert_eq!(first.inserted_count, 2);

        let second = importer.import(rows);
        assert_eq!(second.inserted_count, 0);
        assert_eq!(second.skipped_count, 2);
        assert_eq!(registry.len().unwrap(), 2);
    }

    #[test]
    fn test_new_values_count_as_update() {
        let (_registry, importer) = importer();
        importer.import(vec![BulkRow::new(VendorMention::named("Hooli").with_tax_id("US98765432"), "erp")]);
        let report = importer.import(vec![BulkRow::new(
            VendorMention::named("Hooli").with_tax_id("US98765432").with_phone("+1 650 555 0100"),
            "erp",
        )]);
        assert_eq!(report.updated_count, 1);
        assert_eq!(report.outcomes[0].status, RowStatus::Updated);
    }
}
