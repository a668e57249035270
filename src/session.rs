//! Single owner of the dashboard state: mode, form, current check,
//! feedback flow and stats panel.
//!
//! Every check is tagged with a generation number when it starts. An outcome
//! is applied only if its ticket still matches the latest generation, so a
//! slow response from a superseded check can never overwrite a newer one.

use tracing::{debug, info};

use crate::client::ScoringApi;
use crate::collector::Collector;
use crate::error::{CheckResult, FraudCheckError};
use crate::feedback::{self, Judgement};
use crate::models::{Ack, FeedbackRecord, Mode, ScoreResult, Stats, TransactionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTicket {
    generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckPhase {
    Idle,
    Loading(CheckTicket),
    Scored(ScoreResult),
    Failed(FraudCheckError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackPhase {
    /// No result, or the result has no prediction id.
    Unavailable,
    Ready,
    /// "Incorrect" was chosen; waiting for the note.
    AwaitingNote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Current,
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsPanel {
    pub visible: bool,
    pub snapshot: Option<Stats>,
}

#[derive(Debug, Clone)]
pub struct Session {
    collector: Collector,
    phase: CheckPhase,
    feedback: FeedbackPhase,
    generation: u64,
    stats: StatsPanel,
}

impl Session {
    pub fn new(mode: Mode) -> Self {
        Self::with_collector(Collector::new(mode))
    }

    pub fn with_collector(collector: Collector) -> Self {
        Self {
            collector,
            phase: CheckPhase::Idle,
            feedback: FeedbackPhase::Unavailable,
            generation: 0,
            stats: StatsPanel::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.collector.mode()
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn collector_mut(&mut self) -> &mut Collector {
        &mut self.collector
    }

    pub fn phase(&self) -> &CheckPhase {
        &self.phase
    }

    pub fn feedback_phase(&self) -> FeedbackPhase {
        self.feedback
    }

    pub fn stats(&self) -> &StatsPanel {
        &self.stats
    }

    pub fn result(&self) -> Option<&ScoreResult> {
        match &self.phase {
            CheckPhase::Scored(result) => Some(result),
            _ => None,
        }
    }

    pub fn switch_mode(&mut self, mode: Mode) {
        self.collector.switch_mode(mode);
    }

    /// Collects the form and starts a new check, superseding any check
    /// still in flight. Validation failures leave the state untouched.
    pub fn begin_check(&mut self) -> CheckResult<(CheckTicket, TransactionRecord)> {
        let record = self.collector.collect()?;
        self.generation += 1;
        let ticket = CheckTicket {
            generation: self.generation,
        };
        if let CheckPhase::Loading(previous) = self.phase {
            debug!(
                superseded = previous.generation,
                generation = ticket.generation,
                "superseding in-flight check"
            );
        }
        self.phase = CheckPhase::Loading(ticket);
        self.feedback = FeedbackPhase::Unavailable;
        Ok((ticket, record))
    }

    pub fn finish_check(&mut self, ticket: CheckTicket, outcome: CheckResult<ScoreResult>) -> Applied {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                latest = self.generation,
                "dropping stale check outcome"
            );
            return Applied::Stale;
        }

        match outcome {
            Ok(result) => {
                self.feedback = if result.prediction_id.is_some() {
                    FeedbackPhase::Ready
                } else {
                    FeedbackPhase::Unavailable
                };
                self.phase = CheckPhase::Scored(result);
            }
            Err(err) => {
                self.feedback = FeedbackPhase::Unavailable;
                self.phase = CheckPhase::Failed(err);
            }
        }
        Applied::Current
    }

    pub async fn run_check<A: ScoringApi>(&mut self, api: &A) -> CheckResult<&ScoreResult> {
        let (ticket, record) = self.begin_check()?;
        match api.check_fraud(&record).await {
            Ok(result) => {
                self.finish_check(ticket, Ok(result));
                self.result().ok_or_else(|| {
                    FraudCheckError::InvalidResponse("check finished without a result".to_string())
                })
            }
            Err(err) => {
                self.finish_check(ticket, Err(err.clone()));
                Err(err)
            }
        }
    }

    /// "Yes, correct". Returns the record to send.
    pub fn mark_correct(&mut self) -> CheckResult<FeedbackRecord> {
        let result = self.result_for_feedback()?;
        feedback::prepare(result.prediction_id.as_ref(), result.is_fraud, Judgement::Correct)
    }

    /// "No, incorrect". The note is asked for next.
    pub fn mark_incorrect(&mut self) -> CheckResult<()> {
        self.result_for_feedback()?;
        self.feedback = FeedbackPhase::AwaitingNote;
        Ok(())
    }

    pub fn submit_note(&mut self, note: &str) -> CheckResult<FeedbackRecord> {
        if self.feedback != FeedbackPhase::AwaitingNote {
            return Err(FraudCheckError::local(
                "feedback_note",
                "mark the verdict incorrect before adding a note",
            ));
        }
        let result = self.result_for_feedback()?;
        feedback::prepare(
            result.prediction_id.as_ref(),
            result.is_fraud,
            Judgement::Incorrect {
                note: note.to_string(),
            },
        )
    }

    pub fn cancel_note(&mut self) {
        if self.feedback == FeedbackPhase::AwaitingNote {
            self.feedback = FeedbackPhase::Ready;
        }
    }

    /// The result is done with once its feedback has been accepted.
    pub fn feedback_sent(&mut self) {
        self.phase = CheckPhase::Idle;
        self.feedback = FeedbackPhase::Unavailable;
    }

    pub async fn send_feedback<A: ScoringApi>(&mut self, api: &A, record: &FeedbackRecord) -> CheckResult<Ack> {
        let ack = feedback::send(api, record).await?;
        self.feedback_sent();
        Ok(ack)
    }

    /// Flips the stats panel. Returns `true` when the caller should fetch.
    pub fn toggle_stats(&mut self) -> bool {
        self.stats.visible = !self.stats.visible;
        self.stats.visible
    }

    pub fn set_stats(&mut self, snapshot: Stats) {
        info!(total = snapshot.total_predictions(), "stats refreshed");
        self.stats.snapshot = Some(snapshot);
    }

    fn result_for_feedback(&self) -> CheckResult<&ScoreResult> {
        let result = self
            .result()
            .ok_or(FraudCheckError::Precondition("there is no verdict to give feedback on"))?;
        if result.prediction_id.is_none() {
            return Err(FraudCheckError::Precondition(
                "prediction id is missing; this result was not saved by the service",
            ));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::tests::RecordingApi;
    use crate::models::PredictionId;

    fn score(is_fraud: bool, id: Option<&str>) -> ScoreResult {
        ScoreResult {
            is_fraud,
            fraud_probability: if is_fraud { 0.91 } else { 0.08 },
            risk_level: if is_fraud { "CRITICAL" } else { "MINIMAL" }.to_string(),
            ai_explanation: "test".to_string(),
            prediction_id: id.and_then(PredictionId::parse),
            mode: Mode::CreditCard,
            model_used: None,
            threshold: None,
            message: None,
            transaction_amount: None,
            top_contributing_features: Vec::new(),
        }
    }

    fn ready_session() -> Session {
        let mut session = Session::new(Mode::CreditCard);
        session.collector_mut().set_field("Amount", "120").unwrap();
        session
    }

    #[test]
    fn stale_outcome_never_overwrites_newer_result() {
        let mut session = ready_session();
        let (first, _) = session.begin_check().unwrap();
        let (second, _) = session.begin_check().unwrap();

        assert_eq!(
            session.finish_check(second, Ok(score(false, Some("2")))),
            Applied::Current
        );
        assert_eq!(
            session.finish_check(first, Ok(score(true, Some("1")))),
            Applied::Stale
        );

        let result = session.result().unwrap();
        assert!(!result.is_fraud);
        assert_eq!(result.prediction_id, PredictionId::parse("2"));
    }

    #[test]
    fn begin_check_clears_previous_result() {
        let mut session = ready_session();
        let (ticket, _) = session.begin_check().unwrap();
        session.finish_check(ticket, Ok(score(true, Some("9"))));
        assert!(session.result().is_some());

        session.begin_check().unwrap();
        assert!(matches!(session.phase(), CheckPhase::Loading(_)));
        assert!(session.result().is_none());
        assert_eq!(session.feedback_phase(), FeedbackPhase::Unavailable);
    }

    #[test]
    fn invalid_form_does_not_start_a_check() {
        let mut session = Session::new(Mode::Banking);
        assert!(session.begin_check().is_err());
        assert_eq!(session.phase(), &CheckPhase::Idle);
    }

    #[test]
    fn failed_check_is_recorded() {
        let mut session = ready_session();
        let (ticket, _) = session.begin_check().unwrap();
        session.finish_check(
            ticket,
            Err(FraudCheckError::Network {
                status: None,
                message: "connection refused".to_string(),
            }),
        );
        assert!(matches!(
            session.phase(),
            CheckPhase::Failed(FraudCheckError::Network { status: None, message })
                if message == "connection refused"
        ));
    }

    #[test]
    fn feedback_is_disabled_without_prediction_id() {
        let mut session = ready_session();
        let (ticket, _) = session.begin_check().unwrap();
        session.finish_check(ticket, Ok(score(true, None)));

        assert_eq!(session.feedback_phase(), FeedbackPhase::Unavailable);
        assert!(matches!(session.mark_correct(), Err(FraudCheckError::Precondition(_))));
        assert!(matches!(session.mark_incorrect(), Err(FraudCheckError::Precondition(_))));
    }

    #[test]
    fn incorrect_flow_requires_a_note() {
        let mut session = ready_session();
        let (ticket, _) = session.begin_check().unwrap();
        session.finish_check(ticket, Ok(score(true, Some("5"))));

        assert!(session.submit_note("too early").is_err());
        session.mark_incorrect().unwrap();
        assert_eq!(session.feedback_phase(), FeedbackPhase::AwaitingNote);
        assert!(matches!(
            session.submit_note("  "),
            Err(FraudCheckError::LocalValidation { .. })
        ));

        let record = session.submit_note("wrong location").unwrap();
        assert_eq!(record.actual_class(), 0);
        assert_eq!(record.note(), "wrong location");
    }

    #[tokio::test]
    async fn rejected_check_keeps_its_error_kind() {
        let api = RecordingApi::default();
        api.scores.borrow_mut().push(Err(FraudCheckError::Validation {
            status: 422,
            body: "Missing V1".to_string(),
        }));

        let mut session = ready_session();
        let err = session.run_check(&api).await.unwrap_err();

        assert_eq!(session.phase(), &CheckPhase::Failed(err));
        let CheckPhase::Failed(stored) = session.phase() else {
            panic!("check should have failed");
        };
        assert_eq!(stored.kind(), "validation");
    }

    #[tokio::test]
    async fn full_round_trip_discards_result_after_feedback() {
        let api = RecordingApi::default();
        api.scores.borrow_mut().push(Ok(score(true, Some("77"))));

        let mut session = ready_session();
        let result = session.run_check(&api).await.unwrap();
        assert!(result.is_fraud);
        assert_eq!(api.checks.borrow().len(), 1);

        let record = session.mark_correct().unwrap();
        assert_eq!(record.actual_class(), 1);
        session.send_feedback(&api, &record).await.unwrap();

        assert_eq!(api.feedback.borrow().len(), 1);
        assert_eq!(session.phase(), &CheckPhase::Idle);
        assert!(session.mark_correct().is_err());
    }

    #[test]
    fn mode_switch_keeps_result_but_resets_form() {
        let mut session = ready_session();
        let (ticket, _) = session.begin_check().unwrap();
        session.finish_check(ticket, Ok(score(false, Some("3"))));

        session.switch_mode(Mode::Banking);
        assert_eq!(session.mode(), Mode::Banking);
        assert!(session.result().is_some());
        assert!(session.begin_check().is_err());
    }

    #[test]
    fn stats_toggle_requests_fetch_only_when_opening() {
        let mut session = Session::new(Mode::Banking);
        assert!(session.toggle_stats());
        session.set_stats(Stats::default());
        assert!(!session.toggle_stats());
        assert!(session.stats().snapshot.is_some());
    }
}
