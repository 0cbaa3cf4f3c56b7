//! Trace reconstruction pipeline
//!
//! Runs the stages over one trace source:
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────────────┐   ┌──────────┐
//! │ 1. READ  │──▶│ 2. PARSE │──▶│ 3a. TRACK (lifecycle)│──▶│ 4. REPORT│
//! │ BufRead  │   │ LogEvent │   │ 3b. FRAME + DECODE   │   │ + summary│
//! └──────────┘   └──────────┘   └──────────────────────┘   └──────────┘
//! ```
//!
//! Sequential mode runs every stage in the calling thread. Staged mode runs
//! read+parse on a blocking task, framing (or tracking) on its own task, and
//! decoding on a pool of workers joined through bounded channels. Both modes
//! produce identical reports: transactions carry the sequence number the
//! framer emitted them with, the collector restores that order, then sorts
//! by start time.

use std::io::BufRead;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use super::comm::{FramerCounts, Transaction, TransactionFramer, sort_by_start};
use super::error::{LifecycleError, PipelineError};
use super::event::{Direction, LogEvent};
use super::lifecycle::{ActionStats, CommandRecord, LifecycleTracker, TrackerCounts, TrackerOutput};
use super::names::CommandNames;
use super::parse::{Grammar, LifecycleMarkers, LineParser};
use crate::core::constants::{DEFAULT_BASE_YEAR, DEFAULT_CHANNEL_CAPACITY, DEFAULT_DECODE_WORKERS};
use crate::utils::file::trace_lines;

// ============================================================================
// SETTINGS
// ============================================================================

/// Parser and pipeline settings shared by both grammars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub markers: LifecycleMarkers,
    /// Date attached to timestamps that carry only a time of day
    pub base_date: NaiveDate,
    pub decode_workers: usize,
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            markers: LifecycleMarkers::default(),
            base_date: default_base_date(),
            decode_workers: DEFAULT_DECODE_WORKERS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

pub fn default_base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(DEFAULT_BASE_YEAR, 1, 1).unwrap_or_default()
}

// ============================================================================
// REPORTS
// ============================================================================

/// Counters for one run. Always produced, also when records are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub lines_read: usize,
    pub events_parsed: usize,
    /// Lines that produced no event (malformed or blank)
    pub lines_skipped: usize,
    pub framing: FramerCounts,
    /// Transactions whose payload decoded only partially or not at all
    pub partially_decoded: usize,
    pub lifecycle: TrackerCounts,
    pub records: usize,
    pub lookup_errors: usize,
    pub negative_durations: usize,
}

impl RunSummary {
    /// Parse one line, counting the outcome.
    fn scan(&mut self, parser: &LineParser, line: &str) -> Option<LogEvent> {
        self.lines_read += 1;
        match parser.parse(line) {
            Some(event) => {
                self.events_parsed += 1;
                tracing::trace!(line = self.lines_read, event = %event, "Parsed event");
                Some(event)
            }
            None => {
                self.lines_skipped += 1;
                if !line.trim().is_empty() {
                    tracing::trace!(line = self.lines_read, "Skipping unparseable line");
                }
                None
            }
        }
    }

    fn log(&self, grammar: Grammar) {
        match grammar {
            Grammar::Communication => tracing::info!(
                lines = self.lines_read,
                skipped = self.lines_skipped,
                transactions = self.framing.transactions,
                incomplete = self.framing.incomplete_handshakes,
                restarted = self.framing.restarted,
                unclosed = self.framing.unclosed,
                partially_decoded = self.partially_decoded,
                "Communication trace reconstructed"
            ),
            Grammar::Lifecycle => tracing::info!(
                lines = self.lines_read,
                skipped = self.lines_skipped,
                records = self.records,
                unmatched_finishes = self.lifecycle.unmatched_finishes,
                abandoned = self.lifecycle.abandoned_windows,
                unclosed = self.lifecycle.unclosed_windows,
                lookup_errors = self.lookup_errors,
                negative_durations = self.negative_durations,
                "Lifecycle trace reconstructed"
            ),
        }
    }
}

/// Reconstructed command windows of a lifecycle trace.
#[derive(Debug, Clone)]
pub struct LifecycleReport {
    /// Sorted by start time
    pub records: Vec<CommandRecord>,
    pub stats: Vec<ActionStats>,
    pub errors: Vec<LifecycleError>,
    pub summary: RunSummary,
}

impl LifecycleReport {
    fn new(output: TrackerOutput, mut summary: RunSummary) -> Self {
        summary.lifecycle = output.counts;
        summary.records = output.records.len();
        for error in &output.errors {
            match error {
                LifecycleError::UnknownCommand { .. } => summary.lookup_errors += 1,
                LifecycleError::NegativeDuration { .. } => summary.negative_durations += 1,
            }
        }
        summary.log(Grammar::Lifecycle);

        Self {
            stats: ActionStats::from_records(&output.records),
            records: output.records,
            errors: output.errors,
            summary,
        }
    }
}

/// Reconstructed transactions of a communication trace.
#[derive(Debug, Clone)]
pub struct CommReport {
    /// Both directions, sorted by start time
    pub transactions: Vec<Transaction>,
    pub summary: RunSummary,
}

impl CommReport {
    /// `transactions` must be in framer emission order.
    fn new(
        mut transactions: Vec<Transaction>,
        framing: FramerCounts,
        mut summary: RunSummary,
    ) -> Self {
        sort_by_start(&mut transactions);
        summary.framing = framing;
        summary.partially_decoded = transactions
            .iter()
            .filter(|t| t.is_partially_decoded())
            .count();
        summary.log(Grammar::Communication);
        Self {
            transactions,
            summary,
        }
    }

    /// Number of transactions opened by `direction`.
    pub fn count(&self, direction: Direction) -> usize {
        self.transactions
            .iter()
            .filter(|t| t.direction == direction)
            .count()
    }
}

// ============================================================================
// RECONSTRUCTOR
// ============================================================================

/// Entry point for reconstructing lifecycle and communication traces.
#[derive(Debug, Clone)]
pub struct Reconstructor {
    settings: PipelineSettings,
    names: CommandNames,
}

impl Reconstructor {
    pub fn new(settings: PipelineSettings, names: CommandNames) -> Self {
        Self { settings, names }
    }

    fn parser(&self, grammar: Grammar) -> LineParser {
        LineParser::new(
            grammar,
            self.settings.markers.clone(),
            self.settings.base_date,
        )
    }

    /// Pair command starts and finishes of a lifecycle trace.
    pub fn lifecycle<R: BufRead>(&self, reader: R) -> Result<LifecycleReport, PipelineError> {
        let parser = self.parser(Grammar::Lifecycle);
        let mut summary = RunSummary::default();
        let mut tracker = LifecycleTracker::new(self.names.clone());

        for line in trace_lines(reader) {
            if let Some(event) = summary.scan(&parser, &line?) {
                tracker.observe(&event);
            }
        }

        Ok(LifecycleReport::new(tracker.finish(), summary))
    }

    /// Frame and decode the transactions of a communication trace.
    pub fn comm<R: BufRead>(&self, reader: R) -> Result<CommReport, PipelineError> {
        let parser = self.parser(Grammar::Communication);
        let mut summary = RunSummary::default();
        let mut framer = TransactionFramer::new();
        let mut transactions = Vec::new();

        for line in trace_lines(reader) {
            if let Some(event) = summary.scan(&parser, &line?) {
                transactions.extend(framer.observe(&event).map(Transaction::decode));
            }
        }

        Ok(CommReport::new(transactions, framer.finish(), summary))
    }

    /// Staged variant of [`Reconstructor::lifecycle`].
    pub async fn lifecycle_staged<R>(&self, reader: R) -> Result<LifecycleReport, PipelineError>
    where
        R: BufRead + Send + 'static,
    {
        let (mut events, reader_task) = spawn_reader(
            reader,
            self.parser(Grammar::Lifecycle),
            self.settings.channel_capacity,
        );

        let mut tracker = LifecycleTracker::new(self.names.clone());
        let tracking = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                tracker.observe(&event);
            }
            tracing::debug!(open = tracker.open_windows(), "Tracking stage drained");
            tracker.finish()
        });

        let output = tracking.await?;
        let summary = reader_task.await??;
        Ok(LifecycleReport::new(output, summary))
    }

    /// Staged variant of [`Reconstructor::comm`].
    pub async fn comm_staged<R>(&self, reader: R) -> Result<CommReport, PipelineError>
    where
        R: BufRead + Send + 'static,
    {
        let capacity = self.settings.channel_capacity.max(1);
        let worker_count = self.settings.decode_workers.max(1);
        let (mut events, reader_task) =
            spawn_reader(reader, self.parser(Grammar::Communication), capacity);

        // Decode workers, each fed round-robin by the framing stage
        let (done_tx, mut done_rx) = mpsc::channel::<(usize, Transaction)>(capacity);
        let mut workers = JoinSet::new();
        let mut dispatch = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let (tx, mut rx) = mpsc::channel::<(usize, Transaction)>(capacity);
            dispatch.push(tx);
            let done_tx = done_tx.clone();
            workers.spawn(async move {
                let mut decoded = 0usize;
                while let Some((seq, transaction)) = rx.recv().await {
                    if done_tx.send((seq, transaction.decode())).await.is_err() {
                        break;
                    }
                    decoded += 1;
                }
                tracing::trace!(worker, decoded, "Decode worker finished");
            });
        }
        drop(done_tx);

        let framing = tokio::spawn(async move {
            let mut framer = TransactionFramer::new();
            let mut seq = 0usize;
            while let Some(event) = events.recv().await {
                for transaction in framer.observe(&event) {
                    let worker = &dispatch[seq % dispatch.len()];
                    worker
                        .send((seq, transaction))
                        .await
                        .map_err(|_| PipelineError::Stage {
                            stage: "frame",
                            reason: "decode worker stopped".to_string(),
                        })?;
                    seq += 1;
                }
            }
            tracing::debug!(emitted = seq, "Framing stage drained");
            Ok::<_, PipelineError>(framer.finish())
        });

        let mut decoded: Vec<(usize, Transaction)> = Vec::new();
        while let Some(item) = done_rx.recv().await {
            decoded.push(item);
        }

        let counts = framing.await??;
        while let Some(joined) = workers.join_next().await {
            joined?;
        }
        let summary = reader_task.await??;

        decoded.sort_by_key(|(seq, _)| *seq);
        let transactions = decoded.into_iter().map(|(_, t)| t).collect();
        Ok(CommReport::new(transactions, counts, summary))
    }
}

/// Read and parse on a blocking task, forwarding events over a bounded channel.
fn spawn_reader<R>(
    reader: R,
    parser: LineParser,
    capacity: usize,
) -> (
    mpsc::Receiver<LogEvent>,
    JoinHandle<Result<RunSummary, PipelineError>>,
)
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::task::spawn_blocking(move || {
        let mut summary = RunSummary::default();
        for line in trace_lines(reader) {
            let Some(event) = summary.scan(&parser, &line?) else {
                continue;
            };
            if tx.blocking_send(event).is_err() {
                return Err(PipelineError::Stage {
                    stage: "read",
                    reason: format!("{:?} consumer stopped", parser.grammar()),
                });
            }
        }
        tracing::debug!(lines = summary.lines_read, "Reader stage drained");
        Ok(summary)
    });
    (rx, handle)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
