//! Parallel batch validation.
//!
//! ```text
//!                   job channel                          result channel
//! ┌──────────┐   batch indices    ┌──────────────────┐  (index, result)  ┌──────────┐
//! │  caller  │ ─────────────────▶ │ silex-validate-N │ ────────────────▶ │  caller  │
//! └──────────┘                    │  (worker pool)   │                   │  merge   │
//!                                 └──────────────────┘                   └──────────┘
//!                        shared: caches, error count, stop flag
//! ```
//!
//! Rows are split into contiguous batches of
//! `max(min_batch_size, rows / worker_count)` rows. Each worker validates
//! its batches sequentially into a private [`ValidationResult`]. Once the
//! number of invalid rows reaches the error budget the stop flag is raised:
//! no new row is started, rows in progress run to completion. The caller then
//! waits at most the grace period for the remaining workers before giving
//! up on them.
//!
//! Of two observations with the same key, the one on the lower row is kept
//! and the other is reported as duplicated data, whichever worker reached
//! its row first.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use super::cache::ObservationKey;
use super::config::ImportConfig;
use super::error::ImportError;
use super::result::{CellErrorKind, CsvCell, ValidationResult};
use super::row::ValidationRun;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

type BatchMessage = (usize, Result<ValidationResult, ImportError>);

/// State shared by the workers of one run
struct Shared {
    run: Arc<ValidationRun>,
    rows: Arc<Vec<Vec<String>>>,
    batch_size: usize,
    max_errors: usize,
    invalid_rows: AtomicUsize,
    stop: AtomicBool,
}

impl Shared {
    fn validate_batch(&self, batch: usize) -> Result<ValidationResult, ImportError> {
        let start = batch * self.batch_size;
        let end = (start + self.batch_size).min(self.rows.len());
        let mut local = ValidationResult::new();

        for index in start..end {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let valid = self.run.validate_row(index, &self.rows[index], &mut local)?;
            local.rows_checked += 1;

            if !valid {
                let invalid = self.invalid_rows.fetch_add(1, Ordering::AcqRel) + 1;
                if invalid >= self.max_errors {
                    if !self.stop.swap(true, Ordering::AcqRel) {
                        warn!(
                            "Error budget of {} invalid rows reached at row {}, stopping validation",
                            self.max_errors, index
                        );
                    }
                    break;
                }
            }
        }
        Ok(local)
    }
}

fn spawn_worker(
    id: usize,
    shared: Arc<Shared>,
    jobs: Receiver<usize>,
    results: Sender<BatchMessage>,
) -> Result<JoinHandle<()>, ImportError> {
    let handle = thread::Builder::new()
        .name(format!("silex-validate-{}", id))
        .spawn(move || {
            while let Ok(batch) = jobs.recv() {
                if shared.stop.load(Ordering::Acquire) {
                    break;
                }
                let outcome = shared.validate_batch(batch);
                let failed = outcome.is_err();
                if results.send((batch, outcome)).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(handle)
}

/// Validate all data rows with a pool of workers and merge the per-batch
/// results in batch order
pub(crate) fn validate_rows(
    run: Arc<ValidationRun>,
    rows: Vec<Vec<String>>,
    config: &ImportConfig,
) -> Result<ValidationResult, ImportError> {
    let total = rows.len();
    let batch_size = config.batch_size(total);
    let batch_count = (total + batch_size - 1) / batch_size;
    let worker_count = config.worker_count.max(1).min(batch_count.max(1));
    debug!(
        "Validating {} rows in {} batch(es) of {} with {} worker(s)",
        total, batch_count, batch_size, worker_count
    );

    let shared = Arc::new(Shared {
        run,
        rows: Arc::new(rows),
        batch_size,
        max_errors: config.max_errors,
        invalid_rows: AtomicUsize::new(0),
        stop: AtomicBool::new(false),
    });

    let (job_tx, job_rx) = unbounded::<usize>();
    for batch in 0..batch_count {
        // The receiver is alive, sending cannot fail
        let _ = job_tx.send(batch);
    }
    drop(job_tx);

    let (result_tx, result_rx) = unbounded::<BatchMessage>();
    let mut handles = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        match spawn_worker(id, Arc::clone(&shared), job_rx.clone(), result_tx.clone()) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                shared.stop.store(true, Ordering::Release);
                return Err(e);
            }
        }
    }
    drop(result_tx);

    let mut partials = BTreeMap::new();
    let mut deadline: Option<Instant> = None;
    let mut interrupted = false;

    loop {
        if deadline.is_none() && shared.stop.load(Ordering::Acquire) {
            deadline = Some(Instant::now() + config.grace_period);
        }
        let received = match deadline {
            Some(deadline) => result_rx.recv_deadline(deadline),
            None => result_rx.recv_timeout(POLL_INTERVAL),
        };
        match received {
            Ok((batch, Ok(partial))) => {
                partials.insert(batch, partial);
            }
            Ok((batch, Err(e))) => {
                shared.stop.store(true, Ordering::Release);
                warn!("Batch {} failed: {}", batch, e);
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_some() {
                    warn!(
                        "Validation workers still running after {:?}, abandoning them",
                        config.grace_period
                    );
                    interrupted = true;
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for handle in handles {
        if (!interrupted || handle.is_finished()) && handle.join().is_err() {
            return Err(ImportError::WorkerPanicked);
        }
    }

    let mut merged = ValidationResult::new();
    for (_, partial) in partials {
        merged.merge(partial);
    }
    flag_late_duplicates(&mut merged, &shared);
    merged.interrupted = interrupted;
    debug!(
        "Validated {} of {} rows, {} invalid",
        merged.rows_checked,
        total,
        shared.invalid_rows.load(Ordering::Acquire)
    );
    Ok(merged)
}

/// Flag the observations whose key already belongs to a lower row but that
/// were validated before that row
fn flag_late_duplicates(merged: &mut ValidationResult, shared: &Shared) {
    let mut flagged: HashSet<(usize, usize)> = merged
        .errors_of(CellErrorKind::DuplicatedData)
        .iter()
        .filter_map(|cell| Some((cell.row?, cell.column?)))
        .collect();

    let mut first_rows: HashMap<ObservationKey, usize> = HashMap::new();
    let mut late = Vec::new();
    for (row, cell) in merged.observations() {
        let key = ObservationKey::of(&cell.record);
        if first_rows.contains_key(&key) {
            if flagged.insert((row, cell.column)) {
                late.push((row, cell.column));
            }
        } else {
            first_rows.insert(key, row);
        }
    }
    if late.is_empty() {
        return;
    }

    debug!("{} duplicate observation(s) found after merge", late.len());
    for (row, column) in late {
        let text = shared
            .rows
            .get(row)
            .and_then(|values| values.get(column))
            .map(|value| value.trim())
            .unwrap_or_default();
        merged.add_error(
            CellErrorKind::DuplicatedData,
            CsvCell::new(row, column, text, shared.run.label(column)),
        );
    }
    if let Some(cells) = merged.errors.get_mut(&CellErrorKind::DuplicatedData) {
        cells.sort_by_key(|cell| (cell.row, cell.column));
    }
}
