//! Report sink
//!
//! `text` mirrors the console listings of the controller tools: the per-direction
//! sequence listing, the command timeline preview and overall counts. `json`
//! serializes the same reports for downstream report generators.

use std::fmt::{self, Write as _};
use std::fs;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;

use super::config::{OutputConfig, OutputFormat};
use super::constants::{RULE_WIDTH, TIMELINE_PREVIEW_LEN};
use crate::domain::comm::{ActionDescriptor, Transaction};
use crate::domain::error::{DecodeError, LifecycleError};
use crate::domain::event::Direction;
use crate::domain::lifecycle::{ActionStatsView, CommandRecord};
use crate::domain::pipeline::{CommReport, LifecycleReport, RunSummary};
use crate::utils::time::{delta_millis, delta_secs};

/// Reports produced by one run.
#[derive(Debug, Default, Clone, Copy)]
pub struct Report<'a> {
    pub comm: Option<&'a CommReport>,
    pub lifecycle: Option<&'a LifecycleReport>,
}

/// Overall counts across both traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound_sequences: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound_sequences: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sequences: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_records: Option<usize>,
}

impl Report<'_> {
    pub fn totals(&self) -> Totals {
        let outbound = self.comm.map(|c| c.count(Direction::Outbound));
        let inbound = self.comm.map(|c| c.count(Direction::Inbound));
        Totals {
            outbound_sequences: outbound,
            inbound_sequences: inbound,
            total_sequences: self.comm.map(|c| c.transactions.len()),
            control_records: self.lifecycle.map(|l| l.records.len()),
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => self.render_text().context("Failed to render report"),
            OutputFormat::Json => serde_json::to_string_pretty(&self.json_view())
                .context("Failed to serialize report"),
        }
    }

    // ========================================================================
    // TEXT
    // ========================================================================

    fn render_text(&self) -> Result<String, fmt::Error> {
        let mut out = String::new();
        if let Some(comm) = self.comm {
            write_comm(&mut out, comm)?;
        }
        if let Some(lifecycle) = self.lifecycle {
            write_lifecycle(&mut out, lifecycle)?;
        }

        let totals = self.totals();
        writeln!(out, "\nOverall:")?;
        if let (Some(outbound), Some(inbound), Some(total)) = (
            totals.outbound_sequences,
            totals.inbound_sequences,
            totals.total_sequences,
        ) {
            writeln!(out, "Outbound sequences: {}", outbound)?;
            writeln!(out, "Inbound sequences:  {}", inbound)?;
            writeln!(out, "Total sequences:    {}", total)?;
        }
        if let Some(records) = totals.control_records {
            writeln!(out, "Control records:    {}", records)?;
        }
        Ok(out)
    }

    // ========================================================================
    // JSON
    // ========================================================================

    fn json_view(&self) -> ReportView<'_> {
        ReportView {
            communication: self.comm.map(|comm| CommView {
                transactions: numbered(&comm.transactions)
                    .map(|(sequence, t)| TransactionView::new(sequence, t))
                    .collect(),
                summary: &comm.summary,
            }),
            lifecycle: self.lifecycle.map(|lifecycle| LifecycleView {
                records: &lifecycle.records,
                stats: lifecycle
                    .stats
                    .iter()
                    .map(ActionStatsView::from)
                    .collect(),
                errors: &lifecycle.errors,
                summary: &lifecycle.summary,
            }),
            totals: self.totals(),
        }
    }
}

/// Write the rendered report to the configured file or stdout.
pub fn write_report(report: &Report<'_>, output: &OutputConfig) -> Result<()> {
    let rendered = report.render(output.format)?;
    match &output.path {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            tracing::info!(path = %path.display(), format = %output.format, "Report written");
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Pair transactions with their 1-based sequence number within their direction.
fn numbered(transactions: &[Transaction]) -> impl Iterator<Item = (usize, &Transaction)> {
    let (mut outbound, mut inbound) = (0usize, 0usize);
    transactions.iter().map(move |t| {
        let counter = match t.direction {
            Direction::Outbound => &mut outbound,
            Direction::Inbound => &mut inbound,
        };
        *counter += 1;
        (*counter, t)
    })
}

fn rule(ch: char) -> String {
    std::iter::repeat_n(ch, RULE_WIDTH).collect()
}

fn full_time(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn clock(ts: &NaiveDateTime) -> String {
    ts.format("%H:%M:%S%.3f").to_string()
}

fn write_comm(out: &mut String, comm: &CommReport) -> fmt::Result {
    writeln!(out, "=== Communication sequences ===")?;
    for direction in [Direction::Outbound, Direction::Inbound] {
        let heading = match direction {
            Direction::Outbound => "Outbound",
            Direction::Inbound => "Inbound",
        };
        writeln!(out, "\n{} sequences:\n{}", heading, rule('='))?;
        for (sequence, t) in
            numbered(&comm.transactions).filter(|(_, t)| t.direction == direction)
        {
            write_transaction(out, sequence, t)?;
        }
    }
    Ok(())
}

fn write_transaction(out: &mut String, sequence: usize, t: &Transaction) -> fmt::Result {
    writeln!(out, "\n{} sequence {}:", t.direction, sequence)?;
    writeln!(out, "Start:    {}", full_time(&t.start_time))?;
    writeln!(out, "End:      {}", full_time(&t.end_time))?;
    writeln!(out, "Duration: {:.2} ms", delta_millis(t.duration()))?;
    writeln!(out, "Exchange:")?;
    for line in t.transcript().lines() {
        writeln!(out, "  {}", line)?;
    }
    match t.description() {
        Some(description) => {
            writeln!(out, "Main payload: {} ({})", t.payload_hex(), description)?
        }
        None => writeln!(out, "Main payload: -")?,
    }
    writeln!(out, "{}", "-".repeat(40))
}

fn write_lifecycle(out: &mut String, lifecycle: &LifecycleReport) -> fmt::Result {
    writeln!(out, "\n=== Command lifecycle ===")?;
    writeln!(out, "Parsed {} command records", lifecycle.records.len())?;

    writeln!(
        out,
        "\nTimeline preview (first {} records):\n{}",
        TIMELINE_PREVIEW_LEN,
        rule('-')
    )?;
    for record in lifecycle.records.iter().take(TIMELINE_PREVIEW_LEN) {
        write_record(out, record)?;
    }

    if !lifecycle.stats.is_empty() {
        writeln!(out, "\nAction statistics:")?;
        writeln!(
            out,
            "{:<20} {:>6} {:>12} {:>12} {:>12}",
            "action", "count", "avg ms", "min ms", "max ms"
        )?;
        for stats in &lifecycle.stats {
            let view = ActionStatsView::from(stats);
            writeln!(
                out,
                "{:<20} {:>6} {:>12.3} {:>12.3} {:>12.3}",
                view.action_name, view.count, view.avg_ms, view.min_ms, view.max_ms
            )?;
        }
    }

    if !lifecycle.errors.is_empty() {
        writeln!(out, "\nErrors:")?;
        for error in &lifecycle.errors {
            writeln!(out, "  {}", error)?;
        }
    }
    Ok(())
}

fn write_record(out: &mut String, record: &CommandRecord) -> fmt::Result {
    let (id, name) = (record.command_id, &record.action_name);
    writeln!(out, "Command:  {} ({})", id, name)?;
    writeln!(out, "Start:    {}", clock(&record.start_time))?;
    writeln!(out, "End:      {}", clock(&record.end_time))?;
    writeln!(out, "Elapsed:  {:.3} s", delta_secs(record.duration))?;
    writeln!(out, "{}", rule('-'))
}

// ============================================================================
// JSON VIEWS
// ============================================================================

#[derive(Serialize)]
struct ReportView<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    communication: Option<CommView<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lifecycle: Option<LifecycleView<'a>>,
    totals: Totals,
}

#[derive(Serialize)]
struct CommView<'a> {
    transactions: Vec<TransactionView<'a>>,
    summary: &'a RunSummary,
}

#[derive(Serialize)]
struct TransactionView<'a> {
    sequence: usize,
    direction: Direction,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    duration_ms: f64,
    separator_direction: Option<Direction>,
    main_payload: String,
    action: Option<&'a ActionDescriptor>,
    decode_error: Option<&'a DecodeError>,
    description: Option<String>,
    partially_decoded: bool,
    events: Vec<String>,
}

impl<'a> TransactionView<'a> {
    fn new(sequence: usize, t: &'a Transaction) -> Self {
        let (action, decode_error) = match &t.decoded_action {
            Some(Ok(action)) => (Some(action), None),
            Some(Err(err)) => (None, Some(err)),
            None => (None, None),
        };
        Self {
            sequence,
            direction: t.direction,
            start_time: t.start_time,
            end_time: t.end_time,
            duration_ms: delta_millis(t.duration()),
            separator_direction: t.separator_direction,
            main_payload: t.payload_hex(),
            action,
            decode_error,
            description: t.description(),
            partially_decoded: t.is_partially_decoded(),
            events: t.events.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Serialize)]
struct LifecycleView<'a> {
    records: &'a [CommandRecord],
    stats: Vec<ActionStatsView>,
    errors: &'a [LifecycleError],
    summary: &'a RunSummary,
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::domain::names::CommandNames;
    use crate::domain::pipeline::{PipelineSettings, Reconstructor};

    const COMM: &str = "\
2024-09-24 10:00:00.000: Snd: 05
2024-09-24 10:00:00.010: Rcv: 04
2024-09-24 10:00:00.020: Rcv: 01 08 32
2024-09-24 10:00:00.030: Snd: 06
2024-09-24 10:00:01.000: Rcv: 05
2024-09-24 10:00:01.010: Snd: 04
2024-09-24 10:00:01.020: Snd: 01 01
2024-09-24 10:00:01.030: Rcv: 06
";

    const CONTROL: &str = "\
10:15:02.100 [CmdID / UniID = [517 ][Info][1234 SHM_Updated run]
10:15:03.350 [CmdID / UniID = [517 ][Info][1234 Finish ok]
";

    fn reports() -> (CommReport, LifecycleReport) {
        let reconstructor =
            Reconstructor::new(PipelineSettings::default(), CommandNames::builtin());
        let comm = reconstructor.comm(Cursor::new(COMM.as_bytes())).unwrap();
        let lifecycle = reconstructor
            .lifecycle(Cursor::new(CONTROL.as_bytes()))
            .unwrap();
        (comm, lifecycle)
    }

    #[test]
    fn test_totals() {
        let (comm, lifecycle) = reports();
        let report = Report {
            comm: Some(&comm),
            lifecycle: Some(&lifecycle),
        };
        assert_eq!(
            report.totals(),
            Totals {
                outbound_sequences: Some(1),
                inbound_sequences: Some(1),
                total_sequences: Some(2),
                control_records: Some(1),
            }
        );
    }

    #[test]
    fn test_text_listing() {
        let (comm, lifecycle) = reports();
        let text = Report {
            comm: Some(&comm),
            lifecycle: Some(&lifecycle),
        }
        .render(OutputFormat::Text)
        .unwrap();

        assert!(text.contains("Snd sequence 1:"));
        assert!(text.contains("Rcv sequence 1:"));
        assert!(text.contains("Duration: 30.00 ms"));
        assert!(text.contains("  10:00:00.020 Rcv: 01 08 32"));
        assert!(text.contains("Main payload: 01 08 32 (set speed: 50)"));
        assert!(text.contains("Main payload: 01 01 (status read request)"));
        assert!(text.contains("Command:  517 (HALT)"));
        assert!(text.contains("Elapsed:  1.250 s"));
        assert!(text.contains("Total sequences:    2"));
        assert!(text.contains("Control records:    1"));
    }

    #[test]
    fn test_text_comm_only_has_no_control_count() {
        let (comm, _) = reports();
        let text = Report {
            comm: Some(&comm),
            lifecycle: None,
        }
        .render(OutputFormat::Text)
        .unwrap();
        assert!(!text.contains("Control records"));
        assert!(!text.contains("Command lifecycle"));
    }

    #[test]
    fn test_json_report() {
        let (comm, lifecycle) = reports();
        let json = Report {
            comm: Some(&comm),
            lifecycle: Some(&lifecycle),
        }
        .render(OutputFormat::Json)
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let first = &value["communication"]["transactions"][0];
        assert_eq!(first["sequence"], 1);
        assert_eq!(first["direction"], "outbound");
        assert_eq!(first["main_payload"], "01 08 32");
        assert_eq!(first["action"]["kind"], "set_speed");
        assert_eq!(first["action"]["speed"], 50);
        assert_eq!(first["duration_ms"], 30.0);
        assert_eq!(first["events"].as_array().unwrap().len(), 4);

        let record = &value["lifecycle"]["records"][0];
        assert_eq!(record["command_id"], 517);
        assert_eq!(record["duration"], 1250.0);
        assert_eq!(value["lifecycle"]["stats"][0]["action_name"], "HALT");
        assert_eq!(value["totals"]["control_records"], 1);
    }

    #[test]
    fn test_json_failure_and_completion_actions() {
        const TRACE: &str = "\
2024-09-24 10:00:00.000: Rcv: 05
2024-09-24 10:00:00.010: Rcv: 04
2024-09-24 10:00:00.020: Rcv: 00 63 21 02 05
2024-09-24 10:00:00.030: Snd: 06
2024-09-24 10:00:01.000: Rcv: 05
2024-09-24 10:00:01.010: Rcv: 04
2024-09-24 10:00:01.020: Rcv: 00 62 21
2024-09-24 10:00:01.030: Snd: 06
";
        let reconstructor =
            Reconstructor::new(PipelineSettings::default(), CommandNames::builtin());
        let comm = reconstructor.comm(Cursor::new(TRACE.as_bytes())).unwrap();
        let json = Report {
            comm: Some(&comm),
            lifecycle: None,
        }
        .render(OutputFormat::Json)
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let transactions = &value["communication"]["transactions"];

        let failure = &transactions[0]["action"];
        assert_eq!(failure["kind"], "failure");
        assert_eq!(failure["action"], 0x21);
        assert_eq!(failure["error_type"], 2);
        assert_eq!(failure["error_code"], 5);

        let completion = &transactions[1]["action"];
        assert_eq!(completion["kind"], "completion");
        assert_eq!(completion["action"], 0x21);
        assert_eq!(transactions[1]["description"], "macro finished");
        assert_eq!(completion.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_json_omits_missing_sections() {
        let (_, lifecycle) = reports();
        let json = Report {
            comm: None,
            lifecycle: Some(&lifecycle),
        }
        .render(OutputFormat::Json)
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("communication").is_none());
        assert!(value["totals"].get("total_sequences").is_none());
    }

    #[test]
    fn test_write_report_to_file() {
        let (comm, _) = reports();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let output = OutputConfig {
            format: OutputFormat::Json,
            path: Some(path.clone()),
        };
        write_report(
            &Report {
                comm: Some(&comm),
                lifecycle: None,
            },
            &output,
        )
        .unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"transactions\""));
    }

    #[test]
    fn test_numbering_per_direction() {
        let (comm, _) = reports();
        let numbers: Vec<(usize, Direction)> = numbered(&comm.transactions)
            .map(|(n, t)| (n, t.direction))
            .collect();
        assert_eq!(
            numbers,
            vec![(1, Direction::Outbound), (1, Direction::Inbound)]
        );
    }
}
