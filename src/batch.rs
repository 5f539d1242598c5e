//! Batch orchestrator
//!
//! Splits the dataset into fixed-size batches and runs them on a fixed pool
//! of workers. Failures are contained: a failing or panicking row is dropped
//! from its batch, a batch whose task dies is dropped from the run, and
//! nothing stops the other workers. A single collector owns the aggregate
//! result.

use crate::pipeline::RowProcessor;
use crate::strategy::ResolveError;
use crate::types::{EnrichedRow, InputRow};
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A row excluded from the output because its resolution failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub index: usize,
    pub reason: String,
}

/// A batch excluded from the output because its execution failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub batch: usize,
    /// Positions in the input dataset covered by the batch.
    pub rows: Range<usize>,
    pub reason: String,
}

/// Aggregate outcome of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Successfully enriched rows, in completion order unless sorted.
    pub rows: Vec<EnrichedRow>,
    pub total_rows: usize,
    /// Rows handed to a processor (including those that failed).
    pub rows_attempted: usize,
    /// Rows never attempted because the run was cancelled.
    pub rows_skipped: usize,
    pub row_failures: Vec<RowFailure>,
    pub batch_failures: Vec<BatchFailure>,
    pub cancelled: bool,
}

impl RunReport {
    /// Rows attempted but absent from the output.
    pub fn rows_lost(&self) -> usize {
        self.row_failures.len()
            + self
                .batch_failures
                .iter()
                .map(|b| b.rows.len())
                .sum::<usize>()
    }

    /// Restore input order.
    pub fn sort_by_index(&mut self) {
        self.rows.sort_by_key(EnrichedRow::index);
        self.row_failures.sort_by_key(|f| f.index);
        self.batch_failures.sort_by_key(|f| f.batch);
    }
}

struct Batch {
    number: usize,
    range: Range<usize>,
    rows: Vec<InputRow>,
}

enum BatchOutcome {
    Completed {
        number: usize,
        rows: Vec<EnrichedRow>,
        failures: Vec<RowFailure>,
    },
    Failed(BatchFailure),
}

struct BatchResult {
    rows: Vec<EnrichedRow>,
    failures: Vec<RowFailure>,
}

/// Runs a row processor over a dataset with bounded concurrency.
pub struct BatchOrchestrator {
    processor: Arc<dyn RowProcessor>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(processor: Arc<dyn RowProcessor>) -> Self {
        Self {
            processor,
            cancel: CancellationToken::new(),
        }
    }

    /// Workers stop taking new batches once the token fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process the dataset; at most `worker_count` batches are in flight.
    ///
    /// Zero sizes are treated as one.
    pub async fn run(
        &self,
        dataset: Vec<InputRow>,
        batch_size: usize,
        worker_count: usize,
    ) -> RunReport {
        let batch_size = batch_size.max(1);
        let worker_count = worker_count.max(1);
        let total_rows = dataset.len();

        let batches = split(dataset, batch_size);
        let total_batches = batches.len();
        info!(total_rows, total_batches, batch_size, worker_count, "starting run");

        let queue = Arc::new(Mutex::new(batches));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let workers: Vec<_> = (0..worker_count)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    queue.clone(),
                    self.processor.clone(),
                    self.cancel.clone(),
                    tx.clone(),
                ))
            })
            .collect();
        drop(tx);

        let mut report = RunReport {
            total_rows,
            ..RunReport::default()
        };
        let mut finished_batches = 0usize;
        while let Some(outcome) = rx.recv().await {
            finished_batches += 1;
            match outcome {
                BatchOutcome::Completed {
                    number,
                    rows,
                    failures,
                } => {
                    report.rows_attempted += rows.len() + failures.len();
                    debug!(batch = number, rows = rows.len(), failed = failures.len(), "batch completed");
                    report.rows.extend(rows);
                    report.row_failures.extend(failures);
                }
                BatchOutcome::Failed(failure) => {
                    report.rows_attempted += failure.rows.len();
                    report.batch_failures.push(failure);
                }
            }
            info!(
                batches = finished_batches,
                total_batches,
                rows_done = report.rows.len(),
                total_rows,
                "progress"
            );
        }

        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task failed");
            }
        }

        report.rows_skipped = total_rows.saturating_sub(report.rows_attempted);
        report.cancelled = self.cancel.is_cancelled();
        if report.cancelled {
            warn!(skipped = report.rows_skipped, "run cancelled; remaining rows skipped");
        }
        info!(
            enriched = report.rows.len(),
            lost = report.rows_lost(),
            skipped = report.rows_skipped,
            "run finished"
        );
        report
    }
}

fn split(dataset: Vec<InputRow>, batch_size: usize) -> VecDeque<Batch> {
    let mut batches = VecDeque::new();
    let mut rows = dataset.into_iter().peekable();
    let mut start = 0;
    while rows.peek().is_some() {
        let chunk: Vec<InputRow> = rows.by_ref().take(batch_size).collect();
        let end = start + chunk.len();
        batches.push_back(Batch {
            number: batches.len(),
            range: start..end,
            rows: chunk,
        });
        start = end;
    }
    batches
}

fn next_batch(queue: &Mutex<VecDeque<Batch>>) -> Option<Batch> {
    match queue.lock() {
        Ok(mut q) => q.pop_front(),
        Err(poisoned) => poisoned.into_inner().pop_front(),
    }
}

async fn worker(
    id: usize,
    queue: Arc<Mutex<VecDeque<Batch>>>,
    processor: Arc<dyn RowProcessor>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<BatchOutcome>,
) {
    while !cancel.is_cancelled() {
        let Some(batch) = next_batch(&queue) else {
            break;
        };
        let number = batch.number;
        let range = batch.range.clone();
        debug!(worker = id, batch = number, rows = ?range, "batch started");

        // Own task, so a panic is observed as a JoinError instead of
        // taking the worker down.
        let handle = tokio::spawn(process_batch(processor.clone(), cancel.clone(), batch.rows));
        let outcome = match handle.await {
            Ok(result) => BatchOutcome::Completed {
                number,
                rows: result.rows,
                failures: result.failures,
            },
            Err(e) => {
                let reason = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                error!(batch = number, rows = ?range, reason = %reason, "batch failed; its rows are excluded");
                BatchOutcome::Failed(BatchFailure {
                    batch: number,
                    rows: range,
                    reason,
                })
            }
        };

        if tx.send(outcome).is_err() {
            break;
        }
    }
}

async fn process_batch(
    processor: Arc<dyn RowProcessor>,
    cancel: CancellationToken,
    rows: Vec<InputRow>,
) -> BatchResult {
    let mut result = BatchResult {
        rows: Vec::with_capacity(rows.len()),
        failures: Vec::new(),
    };
    for row in rows {
        if cancel.is_cancelled() {
            break;
        }
        let index = row.index;
        let processor = processor.clone();
        // Own task per row, so a panic loses only this row.
        let handle = tokio::spawn(async move { processor.process(&row).await });
        let reason = match handle.await {
            Ok(Ok(enriched)) => {
                result.rows.push(enriched);
                continue;
            }
            Ok(Err(ResolveError::Cancelled)) => break,
            Ok(Err(e)) => e.to_string(),
            Err(e) if e.is_panic() => panic_message(e.into_panic()),
            Err(e) => e.to_string(),
        };
        warn!(row = index, reason = %reason, "row failed; excluded from output");
        result.failures.push(RowFailure { index, reason });
    }
    result
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
