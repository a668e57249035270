use tracing::info;

use crate::client::ScoringApi;
use crate::error::{CheckResult, FraudCheckError};
use crate::models::{Ack, FeedbackRecord, PredictionId};

pub const CORRECT_NOTE: &str = "Prediction was correct";

const MISSING_ID: &str = "prediction id is missing; this result was not saved by the service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Judgement {
    Correct,
    Incorrect { note: String },
}

/// Builds the record for a verdict the user has judged. Nothing here
/// touches the network, so every rejection happens before a request exists.
pub fn prepare(
    prediction_id: Option<&PredictionId>,
    verdict: bool,
    judgement: Judgement,
) -> CheckResult<FeedbackRecord> {
    let prediction_id = prediction_id.ok_or(FraudCheckError::Precondition(MISSING_ID))?;
    check_note(&judgement)?;

    let verdict_class = u8::from(verdict);
    let (actual_class, note) = match judgement {
        Judgement::Correct => (verdict_class, CORRECT_NOTE.to_string()),
        Judgement::Incorrect { note } => (1 - verdict_class, note.trim().to_string()),
    };

    Ok(FeedbackRecord::new(prediction_id.clone(), actual_class, note))
}

fn check_note(judgement: &Judgement) -> CheckResult<()> {
    match judgement {
        Judgement::Incorrect { note } if note.trim().is_empty() => Err(FraudCheckError::local(
            "feedback_note",
            "describe what the verdict got wrong",
        )),
        _ => Ok(()),
    }
}

/// Feedback on a prediction judged outside a session. The verdict being
/// judged is read back from the service, never taken from the caller.
pub async fn submit_stored<A: ScoringApi>(
    api: &A,
    prediction_id: Option<&PredictionId>,
    judgement: Judgement,
) -> CheckResult<Ack> {
    let prediction_id = prediction_id.ok_or(FraudCheckError::Precondition(MISSING_ID))?;
    check_note(&judgement)?;

    let stored = api.prediction(prediction_id).await?;
    let verdict = match stored.prediction {
        Some(0) => false,
        Some(1) => true,
        other => {
            return Err(FraudCheckError::InvalidResponse(format!(
                "prediction {prediction_id} carries no 0/1 verdict (got {other:?})"
            )))
        }
    };

    submit(api, Some(prediction_id), verdict, judgement).await
}

pub async fn submit<A: ScoringApi>(
    api: &A,
    prediction_id: Option<&PredictionId>,
    verdict: bool,
    judgement: Judgement,
) -> CheckResult<Ack> {
    let record = prepare(prediction_id, verdict, judgement)?;
    send(api, &record).await
}

pub async fn send<A: ScoringApi>(api: &A, record: &FeedbackRecord) -> CheckResult<Ack> {
    let ack = api.submit_feedback(record).await?;
    info!(
        prediction = %record.prediction_id(),
        actual_class = record.actual_class(),
        status = ack.status.as_deref().unwrap_or("ok"),
        "feedback recorded"
    );
    Ok(ack)
}
