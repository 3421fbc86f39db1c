use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use silex_import::import::{DataImporter, ImportConfig};
use silex_import::model::parse_offset;
use silex_import::store::MemoryStore;

mod config;
mod import;
mod validate;

use config::Config;

/// silex-import - Bulk CSV validation and import of scientific observations
#[derive(Parser)]
#[command(name = "silex-import")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by all commands
#[derive(Args)]
pub struct SourceArgs {
    /// Input CSV file path
    #[arg(value_name = "CSV")]
    input: PathBuf,

    /// JSON reference data (experiments, objects, devices, variables, provenances)
    #[arg(long, value_name = "JSON")]
    references: PathBuf,

    /// Provenance URI of the observations
    #[arg(long, value_name = "URI")]
    provenance: String,

    /// Experiment URI every row is attached to
    #[arg(long, value_name = "URI")]
    experiment: Option<String>,

    /// Importing user URI
    #[arg(long, value_name = "URI")]
    user: Option<String>,

    /// Load settings from a TOML config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of validation workers
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Invalid rows tolerated before validation stops
    #[arg(long)]
    max_errors: Option<usize>,

    /// Largest number of data rows accepted
    #[arg(long)]
    max_rows: Option<usize>,

    /// UTC offset of dates without one (e.g. +02:00)
    #[arg(long, value_name = "OFFSET", allow_hyphen_values = true)]
    offset: Option<String>,
}

impl SourceArgs {
    /// Defaults, then the config file, then command-line flags
    fn import_config(&self) -> Result<ImportConfig> {
        let file = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        let mut config = file.import.apply(ImportConfig::default())?;

        if let Some(workers) = self.workers {
            config = config.with_worker_count(workers);
        }
        if let Some(max_errors) = self.max_errors {
            config = config.with_max_errors(max_errors);
        }
        if let Some(max_rows) = self.max_rows {
            config = config.with_max_rows(max_rows);
        }
        if let Some(offset) = &self.offset {
            let offset = parse_offset(offset).with_context(|| format!("Invalid UTC offset: {}", offset))?;
            config = config.with_default_offset(offset);
        }
        Ok(config)
    }

    /// Load the reference data and build an importer over it
    fn importer(&self) -> Result<(Arc<MemoryStore>, DataImporter)> {
        let store = Arc::new(load_references(&self.references)?);
        let mut importer = DataImporter::new(store.clone(), store.clone(), self.import_config()?);
        if let Some(user) = &self.user {
            importer = importer.with_user(user.clone());
        }
        Ok((store, importer))
    }

    fn read_input(&self) -> Result<Vec<u8>> {
        if !self.input.exists() {
            anyhow::bail!("Input file does not exist: {}", self.input.display());
        }
        std::fs::read(&self.input)
            .with_context(|| format!("Failed to read CSV file: {}", self.input.display()))
    }

    fn file_name(&self) -> String {
        self.input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }
}

fn load_references(path: &Path) -> Result<MemoryStore> {
    MemoryStore::from_file(path)
        .with_context(|| format!("Failed to load reference data: {}", path.display()))
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a CSV file against the reference data
    Validate {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a CSV file and import its observations
    Import {
        #[command(flatten)]
        source: SourceArgs,

        /// Write the committed batch as JSON
        #[arg(short = 'o', long, value_name = "JSON")]
        output: Option<PathBuf>,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { source, json } => validate::run(&source, json),
        Commands::Import { source, output } => import::run(&source, output),
    }
}
