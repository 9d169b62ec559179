//! Bulk vendor import from a CSV feed.
//!
//! Imports every row into an in-memory registry using the offline lexical
//! collaborator and prints the JSON import report to stdout.
//!
//! **Usage:**
//! ```bash
//! vendor-import vendors.csv --source-system sap [--config engine.toml] [--with-records]
//! ```

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use vendor_identity::{
    BulkImportReport, BulkImporter, EngineConfig, InMemoryVendorRegistry, LexicalCollaborator, VendorError,
    VendorRecord, VendorResolver,
};

/// Deduplicating vendor import
#[derive(Parser, Debug)]
#[command(name = "vendor-import")]
#[command(about = "Resolve and deduplicate a CSV vendor feed")]
struct Args {
    /// CSV file with a header row
    #[arg(value_name = "CSV")]
    input: PathBuf,

    /// Source system tag for every row
    #[arg(long, default_value = "csv")]
    source_system: String,

    /// Engine configuration (TOML)
    #[arg(long, value_name = "FILE", env = "VENDOR_IMPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Include the resulting vendor records in the output
    #[arg(long)]
    with_records: bool,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct Output {
    report: BulkImportReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    vendors: Option<Vec<VendorRecord>>,
}

fn run(args: &Args) -> Result<Output, VendorError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let registry = Arc::new(InMemoryVendorRegistry::new());
    let resolver = VendorResolver::new(
        registry.clone(),
        Arc::new(LexicalCollaborator::new()),
        config.resolver.clone(),
    )?;
    let importer = BulkImporter::new(Arc::new(resolver), &config.runtime)?;

    let file = File::open(&args.input)
        .map_err(|e| VendorError::config(format!("failed to open {}: {e}", args.input.display())))?;
    info!(input = %args.input.display(), source_system = %args.source_system, "importing");
    let report = importer.import_csv(file, &args.source_system)?;

    let vendors = if args.with_records {
        Some(registry.records()?)
    } else {
        None
    };
    Ok(Output { report, vendors })
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let output = match run(&args) {
        Ok(output) => output,
        Err(err) => {
            error!(error = %err, "import failed");
            return ExitCode::FAILURE;
        }
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    };
    match json {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "failed to serialize report");
            ExitCode::FAILURE
        }
    }
}
