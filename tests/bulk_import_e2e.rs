use std::sync::Arc;

use vendor_identity::{
    AttributeValue, BulkImporter, BulkRow, InMemoryVendorRegistry, LexicalCollaborator, ResolverConfig, RowStatus,
    RuntimeConfig, VendorMention, VendorRegistry, VendorResolver, Verdict,
};

fn importer(workers: usize) -> (Arc<InMemoryVendorRegistry>, BulkImporter) {
    let registry = Arc::new(InMemoryVendorRegistry::new());
    let resolver = VendorResolver::new(
        registry.clone(),
        Arc::new(LexicalCollaborator::new()),
        ResolverConfig::default(),
    )
    .unwrap();
    let importer = BulkImporter::new(
        Arc::new(resolver),
        &RuntimeConfig {
            workers,
            queue_capacity: 8,
        },
    )
    .unwrap();
    (registry, importer)
}

/// Single-token names share no token, so every valid row is a distinct vendor.
fn numbered_rows(n: usize, broken: usize) -> Vec<BulkRow> {
    (0..n)
        .map(|i| {
            let name = if i == broken { String::new() } else { format!("Vendor{i:03}") };
            BulkRow::new(VendorMention::named(name), "erp").with_attribute("erp_code", format!("E{i:05}"))
        })
        .collect()
}

#[test]
fn one_bad_row_does_not_stop_the_batch() {
    let (registry, importer) = importer(4);
    let report = importer.import(numbered_rows(100, 47));

    assert_eq!(report.succeeded(), 99);
    assert_eq!(report.inserted_count, 99);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row_index, 47);
    assert_eq!(report.outcomes.len(), 100);
    assert_eq!(report.outcomes[47].status, RowStatus::Failed);
    assert!(report.outcomes.windows(2).all(|w| w[0].row_index < w[1].row_index));
    assert_eq!(registry.len().unwrap(), 99);
}

#[test]
fn resumed_batch_converges_on_same_state() {
    let (registry, importer) = importer(4);
    let rows = numbered_rows(40, usize::MAX);

    // Simulate an interruption after the first 25 rows.
    let partial = importer.import(rows[..25].to_vec());
    assert_eq!(partial.inserted_count, 25);

    let resumed = importer.import(rows.clone());
    assert_eq!(resumed.inserted_count, 15);
    assert_eq!(resumed.skipped_count, 25);
    assert!(resumed.errors.is_empty());
    assert_eq!(registry.len().unwrap(), 40);

    // Same rows, same ids, on a fresh registry.
    let (fresh, fresh_importer) = self::importer(1);
    let report = fresh_importer.import(rows);
    for (a, b) in report.outcomes.iter().zip(resumed.outcomes.iter()) {
        assert_eq!(a.vendor_id, b.vendor_id);
    }
    assert_eq!(fresh.len().unwrap(), 40);
}

#[test]
fn duplicate_rows_in_one_batch_collapse() {
    let (registry, importer) = importer(1);
    let rows = vec![
        BulkRow::new(VendorMention::named("ACME GmbH").with_tax_id("DE123456789"), "erp"),
        BulkRow::new(
            VendorMention::named("Acme").with_tax_id("DE 123 456 789").with_email("billing@acme.de"),
            "erp",
        ),
        BulkRow::new(VendorMention::named("ACME GmbH").with_tax_id("DE123456789"), "erp"),
    ];
    let report = importer.import(rows);
    assert_eq!(report.inserted_count, 1);
    assert_eq!(report.updated_count, 1);
    assert_eq!(report.skipped_count, 1);
    assert_eq!(registry.len().unwrap(), 1);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.vendor_id == report.outcomes[0].vendor_id));
}

#[test]
fn csv_feed_imports_with_custom_attributes() {
    // One worker keeps rows in feed order.
    let (registry, importer) = importer(1);
    let csv = "Vendor Name,VAT Number,Email,Country,Payment Terms,Credit Limit\n\
               ACME GmbH,DE123456789,ap@acme.de,DE,NET30,5000\n\
               Acme,DE123456789,billing@acme.de,DE,NET60,\n\
               ,,,,,\n\
               Globex,,ap@globex.com,US,NET45,100\n";
    let report = importer.import_csv(csv.as_bytes(), "sap").unwrap();

    assert_eq!(report.inserted_count, 2);
    assert_eq!(report.updated_count, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row_index, 2);
    assert_eq!(registry.len().unwrap(), 2);

    let acme_id = report.outcomes[0].vendor_id.unwrap();
    assert_eq!(report.outcomes[1].verdict, Some(Verdict::Match));
    let acme = registry.get(acme_id).unwrap().unwrap();
    assert!(acme.emails.contains("billing@acme.de"));
    assert_eq!(acme.source_system, "sap");
    // First observed value wins; attributes never overwrite.
    assert_eq!(acme.custom_attributes["payment_terms"], AttributeValue::from("NET30"));
    assert_eq!(acme.custom_attributes["credit_limit"], AttributeValue::Int(5000));
}

#[test]
fn csv_without_name_column_is_rejected() {
    let (registry, importer) = importer(1);
    let err = importer.import_csv("email\nap@acme.de\n".as_bytes(), "sap").unwrap_err();
    assert!(err.is_validation());
    assert!(registry.is_empty().unwrap());
}
