use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FraudCheckError;

pub const PCA_FEATURE_COUNT: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Banking,
    #[value(alias = "credit_card")]
    CreditCard,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Banking => "banking",
            Mode::CreditCard => "credit_card",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Banking => "Banking",
            Mode::CreditCard => "Credit Card",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "POS")]
    Pos,
    Online,
    #[serde(rename = "ATM Withdrawal")]
    AtmWithdrawal,
    Transfer,
}

impl TransactionType {
    pub const ALL: [TransactionType; 4] = [
        TransactionType::Pos,
        TransactionType::Online,
        TransactionType::AtmWithdrawal,
        TransactionType::Transfer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Pos => "POS",
            TransactionType::Online => "Online",
            TransactionType::AtmWithdrawal => "ATM Withdrawal",
            TransactionType::Transfer => "Transfer",
        }
    }
}

impl FromStr for TransactionType {
    type Err = FraudCheckError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        TransactionType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                FraudCheckError::local(
                    "Transaction_Type",
                    format!("expected one of POS, Online, ATM Withdrawal, Transfer; got {trimmed:?}"),
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankingRecord {
    #[serde(rename = "Transaction_Amount")]
    pub amount: f64,
    #[serde(rename = "Account_Balance")]
    pub account_balance: f64,
    #[serde(rename = "Transaction_Type")]
    pub transaction_type: TransactionType,
    /// Always `YYYY-MM-DD HH:MM:SS`.
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Daily_Transaction_Count")]
    pub daily_transaction_count: u32,
    #[serde(rename = "Avg_Transaction_Amount_7d")]
    pub avg_amount_7d: f64,
    #[serde(rename = "Failed_Transaction_Count_7d")]
    pub failed_count_7d: u32,
    #[serde(rename = "Card_Age")]
    pub card_age_days: u32,
    #[serde(rename = "Transaction_Distance")]
    pub distance_km: f64,
    #[serde(rename = "IP_Address_Flag", serialize_with = "bool_as_int")]
    pub suspicious_ip: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditCardRecord {
    pub time_offset_secs: u64,
    pub amount: f64,
    pub features: [f64; PCA_FEATURE_COUNT],
}

impl Serialize for CreditCardRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(PCA_FEATURE_COUNT + 2))?;
        map.serialize_entry("Time", &self.time_offset_secs)?;
        map.serialize_entry("Amount", &self.amount)?;
        for (index, value) in self.features.iter().enumerate() {
            map.serialize_entry(&format!("V{}", index + 1), value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransactionRecord {
    Banking(BankingRecord),
    CreditCard(CreditCardRecord),
}

impl TransactionRecord {
    pub fn mode(&self) -> Mode {
        match self {
            TransactionRecord::Banking(_) => Mode::Banking,
            TransactionRecord::CreditCard(_) => Mode::CreditCard,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            TransactionRecord::Banking(record) => record.amount,
            TransactionRecord::CreditCard(record) => record.amount,
        }
    }
}

/// Body of `POST /api/check-fraud`: the mode followed by the record's fields.
#[derive(Debug, Serialize)]
pub struct CheckRequest<'a> {
    pub mode: Mode,
    #[serde(flatten)]
    pub record: &'a TransactionRecord,
}

impl<'a> From<&'a TransactionRecord> for CheckRequest<'a> {
    fn from(record: &'a TransactionRecord) -> Self {
        Self {
            mode: record.mode(),
            record,
        }
    }
}

/// Server-assigned handle for a stored prediction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PredictionId(String);

impl PredictionId {
    /// Stored predictions are numbered from 1. Returns `None` for anything
    /// else, including the "not saved" markers (empty, `0`), so an id is
    /// always safe to place in a URL path.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_start_matches('#');
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits = trimmed.trim_start_matches('0');
        if digits.is_empty() {
            None
        } else {
            Some(Self(digits.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PredictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn optional_prediction_id<'de, D>(deserializer: D) -> Result<Option<PredictionId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Number(value)) => PredictionId::parse(&value.to_string()),
        Some(RawId::Text(value)) => PredictionId::parse(&value),
        None => None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub value: f64,
    #[serde(default)]
    pub shap_value: f64,
    #[serde(default)]
    pub impact: String,
}

/// Raw `check-fraud` response. The service has used two names for the
/// verdict and the probability, so both are read here.
#[derive(Debug, Deserialize)]
pub struct ScorePayload {
    #[serde(default)]
    pub is_fraud: Option<bool>,
    #[serde(default)]
    pub prediction: Option<u8>,
    #[serde(default)]
    pub fraud_probability: Option<f64>,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub ai_explanation: Option<String>,
    #[serde(default, deserialize_with = "optional_prediction_id")]
    pub prediction_id: Option<PredictionId>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
    #[serde(default)]
    pub top_contributing_features: Vec<FeatureContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub is_fraud: bool,
    pub fraud_probability: f64,
    pub risk_level: String,
    pub ai_explanation: String,
    pub prediction_id: Option<PredictionId>,
    pub mode: Mode,
    pub model_used: Option<String>,
    pub threshold: Option<f64>,
    pub message: Option<String>,
    pub transaction_amount: Option<f64>,
    pub top_contributing_features: Vec<FeatureContribution>,
}

impl ScoreResult {
    /// `requested` fills in the mode when the service omits it.
    pub fn from_payload(payload: ScorePayload, requested: Mode) -> Result<Self, FraudCheckError> {
        let is_fraud = match (payload.is_fraud, payload.prediction) {
            (Some(flag), _) => flag,
            (None, Some(0)) => false,
            (None, Some(1)) => true,
            (None, Some(other)) => {
                return Err(FraudCheckError::InvalidResponse(format!(
                    "prediction must be 0 or 1, got {other}"
                )))
            }
            (None, None) => {
                return Err(FraudCheckError::InvalidResponse(
                    "response carries neither is_fraud nor prediction".to_string(),
                ))
            }
        };

        let fraud_probability = payload
            .fraud_probability
            .or(payload.probability)
            .ok_or_else(|| {
                FraudCheckError::InvalidResponse(
                    "response carries neither fraud_probability nor probability".to_string(),
                )
            })?;

        if !(0.0..=1.0).contains(&fraud_probability) {
            return Err(FraudCheckError::InvalidResponse(format!(
                "fraud probability {fraud_probability} is outside 0..=1"
            )));
        }

        Ok(Self {
            is_fraud,
            fraud_probability,
            risk_level: payload.risk_level.unwrap_or_else(|| "UNKNOWN".to_string()),
            ai_explanation: payload.ai_explanation.unwrap_or_default(),
            prediction_id: payload.prediction_id,
            mode: payload.mode.unwrap_or(requested),
            model_used: payload.model_used,
            threshold: payload.threshold,
            message: payload.message,
            transaction_amount: payload.transaction_amount,
            top_contributing_features: payload.top_contributing_features,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRecord {
    #[serde(skip)]
    prediction_id: PredictionId,
    actual_class: u8,
    feedback_note: String,
}

impl FeedbackRecord {
    /// Only reachable with an identifier in hand; see `feedback::prepare`.
    pub(crate) fn new(prediction_id: PredictionId, actual_class: u8, note: String) -> Self {
        Self {
            prediction_id,
            actual_class,
            feedback_note: note,
        }
    }

    pub fn prediction_id(&self) -> &PredictionId {
        &self.prediction_id
    }

    pub fn actual_class(&self) -> u8 {
        self.actual_class
    }

    pub fn note(&self) -> &str {
        &self.feedback_note
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Ack {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct ModelBreakdown {
    #[serde(default)]
    pub banking: Option<u64>,
    #[serde(default)]
    pub credit_card: Option<u64>,
}

/// Aggregate counters from `GET /api/stats`. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Stats {
    #[serde(default)]
    pub total_predictions: Option<u64>,
    #[serde(default)]
    pub with_feedback: Option<u64>,
    #[serde(default)]
    pub feedback_rate: Option<f64>,
    #[serde(default)]
    pub by_model: Option<ModelBreakdown>,
}

impl Stats {
    pub fn total_predictions(&self) -> u64 {
        self.total_predictions.unwrap_or(0)
    }

    pub fn with_feedback(&self) -> u64 {
        self.with_feedback.unwrap_or(0)
    }

    pub fn feedback_rate(&self) -> f64 {
        self.feedback_rate.filter(|rate| rate.is_finite()).unwrap_or(0.0)
    }

    pub fn feedback_for(&self, mode: Mode) -> u64 {
        let breakdown = self.by_model.unwrap_or_default();
        match mode {
            Mode::Banking => breakdown.banking,
            Mode::CreditCard => breakdown.credit_card,
        }
        .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModeAvailability {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub features: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub modes: std::collections::BTreeMap<String, ModeAvailability>,
    #[serde(default)]
    pub database: bool,
    #[serde(default)]
    pub genai: bool,
}

/// One stored prediction as listed by the history endpoints. Columns vary
/// by server version, so anything beyond the core fields is kept as JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionSummary {
    #[serde(default, deserialize_with = "optional_prediction_id")]
    pub id: Option<PredictionId>,
    #[serde(default, alias = "model_type")]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub prediction: Option<u8>,
    #[serde(default)]
    pub fraud_probability: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub actual_class: Option<u8>,
    #[serde(default, alias = "predicted_at")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PredictionEnvelope {
    pub prediction: PredictionSummary,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PredictionListEnvelope {
    #[serde(default)]
    pub predictions: Vec<PredictionSummary>,
}

/// Opaque descriptor handed over by whatever signed the user in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDescriptor {
    pub display_name: String,
    pub email: String,
}

fn bool_as_int<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn banking() -> BankingRecord {
        BankingRecord {
            amount: 250.0,
            account_balance: 1200.5,
            transaction_type: TransactionType::AtmWithdrawal,
            timestamp: "2026-03-14 09:26:00".to_string(),
            daily_transaction_count: 1,
            avg_amount_7d: 250.0,
            failed_count_7d: 0,
            card_age_days: 100,
            distance_km: 500.0,
            suspicious_ip: true,
        }
    }

    #[test]
    fn banking_request_uses_wire_names() {
        let record = TransactionRecord::Banking(banking());
        let body = serde_json::to_value(CheckRequest::from(&record)).unwrap();

        assert_eq!(body["mode"], "banking");
        assert_eq!(body["Transaction_Type"], "ATM Withdrawal");
        assert_eq!(body["Timestamp"], "2026-03-14 09:26:00");
        assert_eq!(body["IP_Address_Flag"], 1);
        assert_eq!(body["Card_Age"], 100);
    }

    #[test]
    fn credit_card_request_spells_out_pca_features() {
        let mut features = [0.0; PCA_FEATURE_COUNT];
        features[13] = -2.15;
        let record = TransactionRecord::CreditCard(CreditCardRecord {
            time_offset_secs: 68000,
            amount: 225.0,
            features,
        });
        let body = serde_json::to_value(CheckRequest::from(&record)).unwrap();

        assert_eq!(body["mode"], "credit_card");
        assert_eq!(body["Time"], 68000);
        assert_eq!(body["V14"], -2.15);
        assert_eq!(body["V28"], 0.0);
        assert_eq!(body.as_object().unwrap().len(), PCA_FEATURE_COUNT + 3);
    }

    #[test]
    fn canonical_score_payload_decodes() {
        let payload: ScorePayload = serde_json::from_value(json!({
            "is_fraud": true,
            "fraud_probability": 0.8732,
            "risk_level": "CRITICAL",
            "ai_explanation": "Large withdrawal far from home",
            "prediction_id": 42,
            "mode": "banking"
        }))
        .unwrap();
        let result = ScoreResult::from_payload(payload, Mode::Banking).unwrap();

        assert!(result.is_fraud);
        assert_eq!(result.prediction_id, PredictionId::parse("42"));
        assert_eq!(result.risk_level, "CRITICAL");
    }

    #[test]
    fn alias_names_are_accepted() {
        let payload: ScorePayload = serde_json::from_value(json!({
            "prediction": 0,
            "probability": 0.12,
            "risk_level": "MINIMAL",
            "ai_explanation": "Looks routine",
            "top_contributing_features": [
                {"feature": "Amount", "value": 89.0, "shap_value": 0.01, "impact": "decreases"}
            ]
        }))
        .unwrap();
        let result = ScoreResult::from_payload(payload, Mode::CreditCard).unwrap();

        assert!(!result.is_fraud);
        assert_eq!(result.fraud_probability, 0.12);
        assert_eq!(result.mode, Mode::CreditCard);
        assert_eq!(result.prediction_id, None);
        assert_eq!(result.top_contributing_features.len(), 1);
    }

    #[test]
    fn unsaved_prediction_ids_read_as_absent() {
        for raw in [json!(null), json!(""), json!(0), json!("  ")] {
            let payload: ScorePayload = serde_json::from_value(json!({
                "is_fraud": false,
                "fraud_probability": 0.1,
                "prediction_id": raw
            }))
            .unwrap();
            assert_eq!(payload.prediction_id, None);
        }
    }

    #[test]
    fn only_positive_numbers_are_prediction_ids() {
        assert_eq!(PredictionId::parse(" #17 ").unwrap().as_str(), "17");
        assert_eq!(PredictionId::parse("007").unwrap().as_str(), "7");
        assert_eq!(PredictionId::parse("000"), None);
        for raw in ["5?x=1", "../../stats", "12/feedback", "-3", "1e3", "abc"] {
            assert_eq!(PredictionId::parse(raw), None, "{raw}");
        }

        let payload: ScorePayload = serde_json::from_value(json!({
            "is_fraud": true,
            "fraud_probability": 0.9,
            "prediction_id": "5?x=1"
        }))
        .unwrap();
        assert_eq!(payload.prediction_id, None);
    }

    #[test]
    fn history_rows_read_server_column_names() {
        let summary: PredictionSummary = serde_json::from_value(json!({
            "id": 4,
            "model_type": "credit_card",
            "amount": 225.0,
            "prediction": 1,
            "fraud_probability": 0.93,
            "risk_level": "CRITICAL",
            "predicted_at": "2026-03-14T09:26:00"
        }))
        .unwrap();

        assert_eq!(summary.mode, Some(Mode::CreditCard));
        assert_eq!(summary.created_at.as_deref(), Some("2026-03-14T09:26:00"));
        assert!(summary.extra.contains_key("amount"));
    }

    #[test]
    fn verdict_is_required() {
        let payload: ScorePayload =
            serde_json::from_value(json!({"fraud_probability": 0.4})).unwrap();
        let err = ScoreResult::from_payload(payload, Mode::Banking).unwrap_err();
        assert!(matches!(err, FraudCheckError::InvalidResponse(_)));
    }

    #[test]
    fn probability_outside_unit_range_is_rejected() {
        let payload: ScorePayload =
            serde_json::from_value(json!({"is_fraud": true, "fraud_probability": 87.3})).unwrap();
        let err = ScoreResult::from_payload(payload, Mode::Banking).unwrap_err();
        assert!(matches!(err, FraudCheckError::InvalidResponse(_)));
    }

    #[test]
    fn stats_default_missing_counters_to_zero() {
        let stats: Stats = serde_json::from_value(json!({
            "total_predictions": null,
            "by_model": {"banking": 4}
        }))
        .unwrap();

        assert_eq!(stats.total_predictions(), 0);
        assert_eq!(stats.with_feedback(), 0);
        assert_eq!(stats.feedback_rate(), 0.0);
        assert_eq!(stats.feedback_for(Mode::Banking), 4);
        assert_eq!(stats.feedback_for(Mode::CreditCard), 0);
    }

    #[test]
    fn transaction_type_parses_case_insensitively() {
        assert_eq!(
            "atm withdrawal".parse::<TransactionType>().unwrap(),
            TransactionType::AtmWithdrawal
        );
        assert!("Cheque".parse::<TransactionType>().is_err());
    }
}
