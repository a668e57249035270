use std::fmt::Write;

use uuid::Uuid;

use crate::batch::BatchOutcome;
use crate::display::format_confidence;
use crate::models::Mode;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerdictMix {
    pub fraud: usize,
    pub normal: usize,
    pub failed: usize,
    pub unsaved: usize,
    pub avg_probability: f64,
}

pub fn summarize(outcomes: &[BatchOutcome]) -> VerdictMix {
    let mut mix = VerdictMix::default();
    let mut probability_total = 0.0;

    for outcome in outcomes {
        match &outcome.result {
            Ok(result) => {
                if result.is_fraud {
                    mix.fraud += 1;
                } else {
                    mix.normal += 1;
                }
                if result.prediction_id.is_none() {
                    mix.unsaved += 1;
                }
                probability_total += result.fraud_probability;
            }
            Err(_) => mix.failed += 1,
        }
    }

    let scored = mix.fraud + mix.normal;
    mix.avg_probability = if scored == 0 {
        0.0
    } else {
        probability_total / scored as f64
    };
    mix
}

pub fn build_report(run_id: Uuid, mode: Mode, source: &str, outcomes: &[BatchOutcome]) -> String {
    let mix = summarize(outcomes);

    let mut output = String::new();

    let _ = writeln!(output, "# Fraud Check Batch Report");
    let _ = writeln!(
        output,
        "Run {} over {} ({} mode, {} rows)",
        run_id,
        source,
        mode.label(),
        outcomes.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Verdict Mix");

    if outcomes.is_empty() {
        let _ = writeln!(output, "No rows in this batch.");
    } else {
        let _ = writeln!(output, "- fraud: {}", mix.fraud);
        let _ = writeln!(output, "- normal: {}", mix.normal);
        let _ = writeln!(output, "- failed: {}", mix.failed);
        let _ = writeln!(
            output,
            "- average fraud probability: {}",
            format_confidence(mix.avg_probability)
        );
        if mix.unsaved > 0 {
            let _ = writeln!(
                output,
                "- {} scored rows were not saved by the service and cannot receive feedback",
                mix.unsaved
            );
        }
    }

    let mut flagged: Vec<_> = outcomes
        .iter()
        .filter_map(|outcome| match &outcome.result {
            Ok(result) if result.is_fraud => Some((outcome, result)),
            _ => None,
        })
        .collect();
    flagged.sort_by(|a, b| {
        b.1.fraud_probability
            .partial_cmp(&a.1.fraud_probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Flagged Transactions");

    if flagged.is_empty() {
        let _ = writeln!(output, "No transactions flagged in this batch.");
    } else {
        for (outcome, result) in flagged.iter().take(10) {
            let id = result
                .prediction_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "not saved".to_string());
            let _ = writeln!(
                output,
                "- row {} ({}): {} confidence, {} risk, amount {:.2}",
                outcome.row,
                id,
                format_confidence(result.fraud_probability),
                result.risk_level,
                outcome.amount.unwrap_or_default()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Failures");

    let failures: Vec<_> = outcomes
        .iter()
        .filter_map(|outcome| outcome.result.as_ref().err().map(|err| (outcome.row, err)))
        .collect();
    if failures.is_empty() {
        let _ = writeln!(output, "Every row was scored.");
    } else {
        for (row, err) in failures {
            let _ = writeln!(output, "- row {} [{}]: {}", row, err.kind(), err);
        }
    }

    output
}
