use std::io::Read;

use anyhow::{bail, Context};
use tracing::{info, warn};

use crate::client::ScoringApi;
use crate::collector::Collector;
use crate::error::{CheckResult, FraudCheckError};
use crate::models::{Mode, ScoreResult, TransactionRecord};

#[derive(Debug)]
pub struct PendingRow {
    /// 1-based data row, header excluded.
    pub row: usize,
    pub record: CheckResult<TransactionRecord>,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub row: usize,
    pub amount: Option<f64>,
    pub result: CheckResult<ScoreResult>,
}

/// Reads one transaction per CSV row. Headers are wire field names; blank
/// cells and missing columns keep the form defaults. A row that cannot be
/// read, or has more cells than there are headers, is kept as a failed row.
pub fn load_rows<R: Read>(mode: Mode, reader: R) -> anyhow::Result<Vec<PendingRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = reader.headers().context("CSV has no header row")?.clone();

    let mut probe = Collector::new(mode);
    for header in headers.iter() {
        if probe.set_field(header, "").is_err() {
            bail!("column {header:?} is not a {} field", mode.label());
        }
    }

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        let record = match result {
            Ok(record) => collect_row(mode, &headers, &record),
            Err(err) => {
                warn!(row, error = %err, "unreadable CSV row");
                Err(FraudCheckError::local("row", err.to_string()))
            }
        };
        rows.push(PendingRow { row, record });
    }

    Ok(rows)
}

fn collect_row(
    mode: Mode,
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
) -> CheckResult<TransactionRecord> {
    if record.len() > headers.len() {
        return Err(FraudCheckError::local(
            "row",
            format!("{} cells but only {} columns", record.len(), headers.len()),
        ));
    }

    let mut collector = Collector::new(mode);
    headers
        .iter()
        .zip(record.iter())
        .filter(|(_, value)| !value.is_empty())
        .try_for_each(|(name, value)| collector.set_field(name, value))?;
    collector.collect()
}

/// Scores rows one at a time. A failed row is recorded and the run goes on.
pub async fn run<A: ScoringApi>(api: &A, rows: Vec<PendingRow>) -> Vec<BatchOutcome> {
    let mut outcomes = Vec::with_capacity(rows.len());

    for PendingRow { row, record } in rows {
        let outcome = match record {
            Ok(record) => BatchOutcome {
                row,
                amount: Some(record.amount()),
                result: api.check_fraud(&record).await,
            },
            Err(err) => BatchOutcome {
                row,
                amount: None,
                result: Err(err),
            },
        };

        match &outcome.result {
            Ok(result) => info!(row, is_fraud = result.is_fraud, "row scored"),
            Err(err) => warn!(row, kind = err.kind(), error = %err, "row failed"),
        }
        outcomes.push(outcome);
    }

    outcomes
}
