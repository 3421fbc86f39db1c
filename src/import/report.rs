use std::fmt;

#[cfg(feature = "colorized_output")]
use console::style;

use super::result::{CellErrorKind, CsvCell, ValidationResult};

/// Cells listed per error kind before the list is truncated
const MAX_LISTED_CELLS: usize = 20;

/// Status of one report check
#[derive(Debug, Clone)]
pub enum CheckStatus {
    /// Check passed
    Ok,
    /// Check passed with a remark
    Warning(String),
    /// Check failed, with the offending cells
    Failed(String, Vec<String>),
}

impl CheckStatus {
    fn is_ok(&self) -> bool {
        matches!(self, CheckStatus::Ok)
    }

    fn is_failed(&self) -> bool {
        matches!(self, CheckStatus::Failed(..))
    }
}

/// One line of the report
#[derive(Debug, Clone)]
pub struct ReportCheck {
    /// Name of the check
    pub name: String,
    /// Outcome of the check
    pub status: CheckStatus,
}

impl ReportCheck {
    fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
        }
    }

    fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warning(message.into()),
        }
    }

    fn failed(name: impl Into<String>, message: impl Into<String>, cells: Vec<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Failed(message.into(), cells),
        }
    }
}

fn describe_cell(cell: &CsvCell) -> String {
    let position = match (cell.line(), cell.column) {
        (Some(line), Some(column)) => format!("line {}, column {}", line, column + 1),
        (Some(line), None) => format!("line {}", line),
        (None, Some(column)) => format!("column {}", column + 1),
        (None, None) => "unknown position".to_string(),
    };
    match &cell.value {
        Some(value) => format!("{} [{}]: '{}'", position, cell.header, value),
        None => format!("{} [{}]", position, cell.header),
    }
}

fn listed(cells: &[CsvCell]) -> Vec<String> {
    let mut lines: Vec<String> = cells.iter().take(MAX_LISTED_CELLS).map(describe_cell).collect();
    if cells.len() > MAX_LISTED_CELLS {
        lines.push(format!("... and {} more", cells.len() - MAX_LISTED_CELLS));
    }
    lines
}

/// Human-readable import report
#[derive(Debug)]
pub struct ImportReport {
    /// Checks, in display order
    pub checks: Vec<ReportCheck>,
    /// Name of the imported file
    pub file_name: String,
    /// Observations to import
    pub lines_to_import: usize,
    /// Observations imported
    pub lines_imported: usize,
    /// Whether the import went through
    pub valid: bool,
}

impl ImportReport {
    /// Build the report of a validation or import result
    pub fn from_result(file_name: impl Into<String>, result: &ValidationResult) -> Self {
        let mut checks = Vec::new();

        if result.has_header_errors() {
            let mut cells: Vec<String> = result
                .missing_headers
                .iter()
                .map(|missing| format!("missing header: {}", missing))
                .collect();
            cells.extend(
                result
                    .empty_headers
                    .iter()
                    .map(|column| format!("empty header at column {}", column)),
            );
            cells.extend(result.invalid_header_uris.iter().map(describe_cell));
            checks.push(ReportCheck::failed("Headers", "header row rejected", cells));
        } else {
            checks.push(ReportCheck::ok("Headers"));
        }

        if let Some(message) = &result.error_message {
            checks.push(ReportCheck::failed("Content", message.clone(), Vec::new()));
        }
        if result.too_large_dataset {
            checks.push(ReportCheck::failed(
                "Dataset size",
                "the dataset is too large to be imported at once",
                Vec::new(),
            ));
        }
        if result.interrupted {
            checks.push(ReportCheck::warning(
                "Completeness",
                format!("validation stopped after {} row(s)", result.rows_checked),
            ));
        }

        for (kind, cells) in &result.errors {
            if !cells.is_empty() {
                checks.push(ReportCheck::failed(
                    kind.description(),
                    format!("{} cell(s)", cells.len()),
                    listed(cells),
                ));
            }
        }
        if result.validation_step && !result.has_header_errors() && result.cell_error_count() == 0 {
            checks.push(ReportCheck::ok("Rows"));
        }

        if !result.errors_of(CellErrorKind::DuplicatedData).is_empty() && result.insertion_step {
            checks.push(ReportCheck::warning("Insertion", "some observations were rejected by storage"));
        } else if result.insertion_step {
            checks.push(ReportCheck::ok("Insertion"));
        }

        Self {
            checks,
            file_name: file_name.into(),
            lines_to_import: result.lines_to_import,
            lines_imported: result.lines_imported,
            valid: result.valid,
        }
    }

    /// Check if any check failed
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status.is_failed())
    }

    /// Count the successful checks
    pub fn success_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status.is_ok()).count()
    }

    /// Count the warnings
    pub fn warning_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| matches!(c.status, CheckStatus::Warning(_)))
            .count()
    }

    /// Count the failures
    pub fn failure_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status.is_failed()).count()
    }

    /// Format the report with colors (requires console feature)
    pub fn format_colored(&self) -> String {
        #[cfg(feature = "colorized_output")]
        {
            use console::Emoji;

            static OK: Emoji<'_, '_> = Emoji("✓", "[OK]");
            static WARN: Emoji<'_, '_> = Emoji("⚠", "[WARN]");
            static FAIL: Emoji<'_, '_> = Emoji("✗", "[FAIL]");

            let mut output = String::new();

            output.push_str(&format!("{}\n", style("Data Import Report").bold().cyan()));
            output.push_str(&format!("{}\n", style("==================").cyan()));
            output.push_str(&format!("{}: {}\n\n", style("File").bold(), self.file_name));

            for check in &self.checks {
                let (symbol, color_fn): (_, fn(&str) -> console::StyledObject<&str>) = match &check.status {
                    CheckStatus::Ok => (OK, |s| style(s).green()),
                    CheckStatus::Warning(_) => (WARN, |s| style(s).yellow()),
                    CheckStatus::Failed(..) => (FAIL, |s| style(s).red()),
                };

                output.push_str(&format!("[{}] {}", symbol, color_fn(&check.name)));

                match &check.status {
                    CheckStatus::Ok => output.push('\n'),
                    CheckStatus::Warning(msg) => {
                        output.push_str(&format!(" - {}: {}\n", style("WARNING").yellow().bold(), msg));
                    }
                    CheckStatus::Failed(msg, cells) => {
                        output.push_str(&format!(" - {}: {}\n", style("FAILED").red().bold(), msg));
                        for cell in cells {
                            output.push_str(&format!("      {}\n", style(cell).dim()));
                        }
                    }
                }
            }

            output.push('\n');
            output.push_str(&format!(
                "{}: {} to import, {} imported\n",
                style("Observations").bold(),
                self.lines_to_import,
                style(self.lines_imported).green()
            ));

            output.push('\n');
            if self.valid {
                output.push_str(&format!("{}\n", style("Import data VALID").green().bold()));
            } else {
                output.push_str(&format!("{}\n", style("Import data INVALID").red().bold()));
            }

            output
        }

        #[cfg(not(feature = "colorized_output"))]
        {
            format!("{}", self)
        }
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data Import Report")?;
        writeln!(f, "==================")?;
        writeln!(f, "File: {}", self.file_name)?;
        writeln!(f)?;

        for check in &self.checks {
            let symbol = match &check.status {
                CheckStatus::Ok => "✓",
                CheckStatus::Warning(_) => "⚠",
                CheckStatus::Failed(..) => "✗",
            };

            write!(f, "[{}] {}", symbol, check.name)?;

            match &check.status {
                CheckStatus::Ok => writeln!(f)?,
                CheckStatus::Warning(msg) => writeln!(f, " - WARNING: {}", msg)?,
                CheckStatus::Failed(msg, cells) => {
                    writeln!(f, " - FAILED: {}", msg)?;
                    for cell in cells {
                        writeln!(f, "      {}", cell)?;
                    }
                }
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "Summary: {} passed, {} warnings, {} failed",
            self.success_count(),
            self.warning_count(),
            self.failure_count()
        )?;
        writeln!(
            f,
            "Observations: {} to import, {} imported",
            self.lines_to_import, self.lines_imported
        )?;

        writeln!(f)?;
        if self.valid {
            writeln!(f, "Import data VALID")?;
        } else {
            writeln!(f, "Import data INVALID")?;
        }

        Ok(())
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ImportReport::from_result("<csv>", self))
    }
}

impl ValidationResult {
    /// Machine-readable report
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
