use anyhow::{Context, Result};
use log::info;

use silex_import::import::ImportReport;

use super::SourceArgs;

/// Validate a CSV file without importing it
pub fn run(source: &SourceArgs, json: bool) -> Result<()> {
    info!("silex-import Validator");
    info!("======================");
    info!("File: {}", source.input.display());
    info!("Provenance: {}", source.provenance);

    let content = source.read_input()?;
    let (_, importer) = source.importer()?;

    let result = importer
        .validate_csv(&source.provenance, source.experiment.as_deref(), &content)
        .context("Validation failed")?;

    if json {
        println!("{}", result.to_json().context("Failed to serialize report")?);
    } else {
        let report = ImportReport::from_result(source.file_name(), &result);

        // Use colorized output if available
        #[cfg(feature = "colorized_output")]
        {
            println!("{}", report.format_colored());
        }

        #[cfg(not(feature = "colorized_output"))]
        {
            println!("{}", report);
        }
    }

    if let Some(key) = &result.validation_key {
        info!("Validation key: {}", key);
    }

    // Exit with error code if validation failed
    if !result.valid {
        std::process::exit(1);
    }

    Ok(())
}
