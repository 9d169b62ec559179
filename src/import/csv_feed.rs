//! CSV front-end for bulk feeds.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::attribute::AttributeValue;
use crate::error::{ValidationError, VendorResult};
use crate::import::{BulkRow, RowError};
use crate::vendor::VendorMention;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Name,
    TaxId,
    Address,
    Email,
    Phone,
    Country,
    Attribute(String),
}

/// `Name Of Column` → `name_of_column`.
fn header_key(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '.')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn classify(header: &str) -> Column {
    let key = header_key(header);
    match key.as_str() {
        "name" | "vendor" | "vendor_name" | "supplier" | "supplier_name" | "company" | "company_name"
        | "legal_name" | "payee" => Column::Name,
        "tax_id" | "taxid" | "vat" | "vat_id" | "vat_no" | "vat_number" | "tin" | "ein" | "tax_number" => {
            Column::TaxId
        }
        "address" | "street_address" | "billing_address" | "vendor_address" => Column::Address,
        "email" | "emails" | "email_address" | "contact_email" | "e_mail" => Column::Email,
        "phone" | "phone_number" | "telephone" | "tel" => Column::Phone,
        "country" | "country_code" => Column::Country,
        _ => Column::Attribute(key),
    }
}

fn to_row(columns: &[Column], record: &StringRecord, source_system: &str) -> BulkRow {
    let mut row = BulkRow::new(VendorMention::default(), source_system);
    for (column, value) in columns.iter().zip(record.iter()) {
        if value.is_empty() {
            continue;
        }
        let value = value.to_string();
        match column {
            Column::Name => row.mention.name = value,
            Column::TaxId => row.mention.tax_id = Some(value),
            Column::Address => row.mention.address = Some(value),
            Column::Email => row.mention.email = Some(value),
            Column::Phone => row.mention.phone = Some(value),
            Column::Country => row.mention.country = Some(value),
            Column::Attribute(key) => {
                let inferred = AttributeValue::infer(&value);
                if !inferred.is_null() {
                    row.custom_attributes.insert(key.clone(), inferred);
                }
            }
        }
    }
    row
}

/// Parses a headed CSV feed into indexed rows and per-record errors.
pub(crate) fn read_rows<R: Read>(reader: R, source_system: &str) -> VendorResult<(Vec<(usize, BulkRow)>, Vec<RowError>)> {
    let mut reader = ReaderBuilder::new().has_headers(true).trim(Trim::All).from_reader(reader);

    let headers = reader.headers().map_err(|e| ValidationError::InvalidField {
        field: "header".to_string(),
        reason: e.to_string(),
    })?;
    let columns: Vec<Column> = headers.iter().map(classify).collect();
    if !columns.contains(&Column::Name) {
        return Err(ValidationError::MissingField {
            field: "name".to_string(),
        }
        .into());
    }

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for (row_index, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push((row_index, to_row(&columns, &record, source_system))),
            Err(e) => errors.push(RowError {
                row_index,
                message: format!("malformed CSV record: {e}"),
            }),
        }
    }
    Ok((rows, errors))
}
