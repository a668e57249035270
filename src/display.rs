use std::fmt::Write;

use crate::models::{HealthStatus, Mode, PredictionSummary, ScoreResult, Stats, UserDescriptor};

/// `0.8732` -> `87.32%`. Pure; the probability is already in 0..=1.
pub fn format_confidence(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

pub fn verdict_label(is_fraud: bool) -> &'static str {
    if is_fraud {
        "FRAUD DETECTED"
    } else {
        "Normal transaction"
    }
}

pub fn render_result(result: &ScoreResult) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "== {} ==", verdict_label(result.is_fraud));
    let _ = writeln!(output, "Mode:        {}", result.mode.label());
    if let Some(model) = &result.model_used {
        let _ = writeln!(output, "Model:       {model}");
    }
    let _ = writeln!(output, "Confidence:  {}", format_confidence(result.fraud_probability));
    let _ = writeln!(output, "Risk level:  {}", result.risk_level);
    match &result.prediction_id {
        Some(id) => {
            let _ = writeln!(output, "Prediction:  {id}");
        }
        None => {
            let _ = writeln!(output, "Prediction:  not saved");
        }
    }

    if !result.ai_explanation.trim().is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "{}", result.ai_explanation.trim());
    }

    if !result.top_contributing_features.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Top contributing features:");
        for feature in result.top_contributing_features.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} = {:.4} ({} risk, weight {:+.4})",
                feature.feature, feature.value, feature.impact, feature.shap_value
            );
        }
    }

    let _ = writeln!(output);
    if result.prediction_id.is_some() {
        let _ = writeln!(output, "Was this verdict correct? Feedback is enabled.");
    } else {
        let _ = writeln!(
            output,
            "Feedback disabled: the service did not save this prediction, so there is no id to attach it to."
        );
    }

    output
}

pub fn render_stats(stats: &Stats, registered_users: Option<usize>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "== System Statistics ==");
    let _ = writeln!(output, "Total predictions:  {}", stats.total_predictions());
    let _ = writeln!(output, "With feedback:      {}", stats.with_feedback());
    let _ = writeln!(output, "Feedback rate:      {}%", stats.feedback_rate());
    if let Some(users) = registered_users {
        let _ = writeln!(output, "Registered users:   {users}");
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "Feedback by model:");
    for mode in [Mode::Banking, Mode::CreditCard] {
        let _ = writeln!(output, "- {}: {}", mode.label(), stats.feedback_for(mode));
    }

    output
}

pub fn render_health(health: &HealthStatus) -> String {
    let mut output = String::new();

    let service = health.service.as_deref().unwrap_or("scoring service");
    let _ = writeln!(output, "{service}: {}", health.status);
    for (mode, availability) in &health.modes {
        let state = if availability.available { "available" } else { "unavailable" };
        let _ = writeln!(output, "- {mode}: {state} ({} features)", availability.features);
    }
    let _ = writeln!(output, "database: {}", on_off(health.database));
    let _ = writeln!(output, "explanations: {}", on_off(health.genai));

    output
}

pub fn render_predictions(predictions: &[PredictionSummary]) -> String {
    let mut output = String::new();

    if predictions.is_empty() {
        let _ = writeln!(output, "No stored predictions.");
        return output;
    }

    for prediction in predictions {
        let id = prediction
            .id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mode = prediction.mode.map(Mode::label).unwrap_or("?");
        let verdict = match prediction.prediction {
            Some(1) => "fraud",
            Some(_) => "normal",
            None => "?",
        };
        let confidence = prediction
            .fraud_probability
            .map(format_confidence)
            .unwrap_or_else(|| "-".to_string());
        let feedback = match prediction.actual_class {
            Some(1) => "confirmed fraud",
            Some(_) => "confirmed normal",
            None => "no feedback",
        };
        let _ = write!(output, "{id} {mode} {verdict} {confidence} [{feedback}]");
        if let Some(created_at) = &prediction.created_at {
            let _ = write!(output, " at {created_at}");
        }
        let _ = writeln!(output);
    }

    output
}

/// Summary line followed by every extra column the service stored.
pub fn render_prediction_detail(prediction: &PredictionSummary) -> String {
    let mut output = render_predictions(std::slice::from_ref(prediction));

    for (key, value) in &prediction.extra {
        let shown = match value {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let _ = writeln!(output, "  {key}: {shown}");
    }

    output
}

pub fn render_user(user: &UserDescriptor, demo: bool) -> String {
    if demo {
        format!("{} <{}> (demo mode)", user.display_name, user.email)
    } else {
        format!("{} <{}>", user.display_name, user.email)
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelBreakdown, PredictionId};

    fn result(prediction_id: Option<&str>) -> ScoreResult {
        ScoreResult {
            is_fraud: true,
            fraud_probability: 0.8732,
            risk_level: "CRITICAL".to_string(),
            ai_explanation: "Withdrawal far from the usual location.".to_string(),
            prediction_id: prediction_id.and_then(PredictionId::parse),
            mode: Mode::Banking,
            model_used: Some("Banking".to_string()),
            threshold: Some(0.5),
            message: None,
            transaction_amount: Some(900.0),
            top_contributing_features: Vec::new(),
        }
    }

    #[test]
    fn confidence_is_two_decimal_percentage() {
        assert_eq!(format_confidence(0.8732), "87.32%");
        assert_eq!(format_confidence(0.0), "0.00%");
        assert_eq!(format_confidence(1.0), "100.00%");
    }

    #[test]
    fn formatting_leaves_probability_untouched() {
        let scored = result(Some("1"));
        let _ = render_result(&scored);
        assert_eq!(scored.fraud_probability, 0.8732);
    }

    #[test]
    fn result_shows_id_and_enables_feedback() {
        let text = render_result(&result(Some("12")));
        assert!(text.contains("FRAUD DETECTED"));
        assert!(text.contains("87.32%"));
        assert!(text.contains("#12"));
        assert!(text.contains("Feedback is enabled"));
    }

    #[test]
    fn unsaved_result_explains_disabled_feedback() {
        let text = render_result(&result(None));
        assert!(text.contains("not saved"));
        assert!(text.contains("Feedback disabled"));
    }

    #[test]
    fn empty_stats_render_as_zero() {
        let text = render_stats(&Stats::default(), None);
        assert!(text.contains("Total predictions:  0"));
        assert!(text.contains("With feedback:      0"));
        assert!(text.contains("Feedback rate:      0%"));
        assert!(text.contains("- Banking: 0"));
        assert!(text.contains("- Credit Card: 0"));
        assert!(!text.contains("Registered users"));
    }

    #[test]
    fn stats_include_breakdown_and_users() {
        let stats = Stats {
            total_predictions: Some(120),
            with_feedback: Some(30),
            feedback_rate: Some(25.0),
            by_model: Some(ModelBreakdown {
                banking: Some(18),
                credit_card: None,
            }),
        };
        let text = render_stats(&stats, Some(4));
        assert!(text.contains("Feedback rate:      25%"));
        assert!(text.contains("- Banking: 18"));
        assert!(text.contains("- Credit Card: 0"));
        assert!(text.contains("Registered users:   4"));
    }

    #[test]
    fn detail_lists_extra_columns() {
        let prediction: PredictionSummary = serde_json::from_value(serde_json::json!({
            "id": 7,
            "mode": "credit_card",
            "prediction": 1,
            "fraud_probability": 0.91,
            "feedback_note": "confirmed by customer",
            "threshold": 0.5
        }))
        .unwrap();

        let text = render_prediction_detail(&prediction);
        assert!(text.starts_with("#7 Credit Card fraud 91.00% [no feedback]"));
        assert!(text.contains("  feedback_note: confirmed by customer"));
        assert!(text.contains("  threshold: 0.5"));
    }

    #[test]
    fn empty_history_is_reported() {
        assert_eq!(render_predictions(&[]), "No stored predictions.\n");
    }
}
