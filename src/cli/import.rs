use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use silex_import::import::ImportReport;

use super::SourceArgs;

/// Validate a CSV file and import its observations into the reference store
pub fn run(source: &SourceArgs, output: Option<PathBuf>) -> Result<()> {
    info!("silex-import Importer");
    info!("=====================");
    info!("File: {}", source.input.display());
    info!("Provenance: {}", source.provenance);

    let content = source.read_input()?;
    let (store, importer) = source.importer()?;

    let result = importer
        .import_csv(&source.provenance, source.experiment.as_deref(), &content, None)
        .context("Import failed")?;

    let report = ImportReport::from_result(source.file_name(), &result);

    #[cfg(feature = "colorized_output")]
    {
        println!("{}", report.format_colored());
    }

    #[cfg(not(feature = "colorized_output"))]
    {
        println!("{}", report);
    }

    if !result.valid {
        std::process::exit(1);
    }

    if let Some(batch_uri) = &result.batch_uri {
        info!("Batch: {}", batch_uri);
    }
    if let Some(document_uri) = &result.document_uri {
        info!("Archived document: {}", document_uri);
    }

    if let Some(output) = output {
        let batches = store.committed_batches();
        let json = serde_json::to_string_pretty(&batches).context("Failed to serialize batch")?;
        std::fs::write(&output, json)
            .with_context(|| format!("Failed to write batch: {}", output.display()))?;
        info!("Batch written to {}", output.display());
    }

    Ok(())
}
