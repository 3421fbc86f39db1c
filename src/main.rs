//! # silex-import
//!
//! A command-line tool for validating and importing CSV observation files.
//!
//! ## Usage
//!
//! ```bash
//! # Validate a file against a reference data dump
//! silex-import validate data.csv --references refs.json --provenance http://example.org/prov/1
//!
//! # Validate, import and dump the committed batch
//! silex-import -v import data.csv --references refs.json \
//!     --provenance http://example.org/prov/1 --output batch.json
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity
    cli::init_logging(cli.verbosity());

    cli::dispatch(cli)
}
