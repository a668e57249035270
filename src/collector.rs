//! Editable transaction form, one field set per mode.
//!
//! Values are held as the raw text the user typed and are only parsed on
//! [`Collector::collect`], so a half-edited form never fails early.

use chrono::{NaiveDateTime, Utc};

use crate::error::{CheckResult, FraudCheckError};
use crate::models::{
    BankingRecord, CreditCardRecord, Mode, TransactionRecord, TransactionType, PCA_FEATURE_COUNT,
};

pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const INPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    Normal,
    Fraud,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankingForm {
    amount: String,
    balance: String,
    transaction_type: String,
    timestamp: String,
    daily_count: String,
    avg_amount_7d: String,
    failed_count_7d: String,
    card_age: String,
    distance_km: String,
    ip_flag: String,
}

impl BankingForm {
    const FIELDS: [&'static str; 10] = [
        "Transaction_Amount",
        "Account_Balance",
        "Transaction_Type",
        "Timestamp",
        "Daily_Transaction_Count",
        "Avg_Transaction_Amount_7d",
        "Failed_Transaction_Count_7d",
        "Card_Age",
        "Transaction_Distance",
        "IP_Address_Flag",
    ];

    pub fn with_timestamp(now: NaiveDateTime) -> Self {
        Self {
            amount: String::new(),
            balance: String::new(),
            transaction_type: TransactionType::Pos.as_str().to_string(),
            timestamp: now.format(INPUT_TIMESTAMP_FORMAT).to_string(),
            daily_count: "1".to_string(),
            avg_amount_7d: String::new(),
            failed_count_7d: "0".to_string(),
            card_age: "100".to_string(),
            distance_km: "500".to_string(),
            ip_flag: "0".to_string(),
        }
    }

    fn slot(&mut self, index: usize) -> &mut String {
        match index {
            0 => &mut self.amount,
            1 => &mut self.balance,
            2 => &mut self.transaction_type,
            3 => &mut self.timestamp,
            4 => &mut self.daily_count,
            5 => &mut self.avg_amount_7d,
            6 => &mut self.failed_count_7d,
            7 => &mut self.card_age,
            8 => &mut self.distance_km,
            _ => &mut self.ip_flag,
        }
    }

    fn values(&self) -> [&str; 10] {
        [
            &self.amount,
            &self.balance,
            &self.transaction_type,
            &self.timestamp,
            &self.daily_count,
            &self.avg_amount_7d,
            &self.failed_count_7d,
            &self.card_age,
            &self.distance_km,
            &self.ip_flag,
        ]
    }

    fn collect(&self) -> CheckResult<BankingRecord> {
        let amount = parse_decimal("Transaction_Amount", required("Transaction_Amount", &self.amount)?)?;
        let account_balance = parse_decimal("Account_Balance", required("Account_Balance", &self.balance)?)?;
        let avg_amount_7d = match self.avg_amount_7d.trim() {
            "" => amount,
            raw => parse_decimal("Avg_Transaction_Amount_7d", raw)?,
        };
        let distance_km = parse_decimal("Transaction_Distance", &self.distance_km)?;
        if distance_km < 0.0 {
            return Err(FraudCheckError::local(
                "Transaction_Distance",
                "must not be negative",
            ));
        }

        Ok(BankingRecord {
            amount,
            account_balance,
            transaction_type: self.transaction_type.parse()?,
            timestamp: normalize_timestamp(&self.timestamp)?,
            daily_transaction_count: parse_count("Daily_Transaction_Count", &self.daily_count)?,
            avg_amount_7d,
            failed_count_7d: parse_count("Failed_Transaction_Count_7d", &self.failed_count_7d)?,
            card_age_days: parse_count("Card_Age", &self.card_age)?,
            distance_km,
            suspicious_ip: parse_flag("IP_Address_Flag", &self.ip_flag)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditCardForm {
    time: String,
    amount: String,
    features: [String; PCA_FEATURE_COUNT],
}

impl Default for CreditCardForm {
    fn default() -> Self {
        Self {
            time: "0".to_string(),
            amount: String::new(),
            features: std::array::from_fn(|_| "0".to_string()),
        }
    }
}

impl CreditCardForm {
    fn from_preset(preset: Preset) -> Self {
        let (time, amount, features) = match preset {
            Preset::Normal => ("35000", "89", NORMAL_SAMPLE),
            Preset::Fraud => ("68000", "225", FRAUD_SAMPLE),
        };
        Self {
            time: time.to_string(),
            amount: amount.to_string(),
            features: features.map(|value| value.to_string()),
        }
    }

    fn slot(&mut self, name: &str) -> Option<&mut String> {
        if name.eq_ignore_ascii_case("Time") {
            return Some(&mut self.time);
        }
        if name.eq_ignore_ascii_case("Amount") {
            return Some(&mut self.amount);
        }
        let index: usize = name
            .strip_prefix('V')
            .or_else(|| name.strip_prefix('v'))?
            .parse()
            .ok()?;
        if (1..=PCA_FEATURE_COUNT).contains(&index) {
            Some(&mut self.features[index - 1])
        } else {
            None
        }
    }

    fn collect(&self) -> CheckResult<CreditCardRecord> {
        let time_raw = required("Time", &self.time)?;
        let time_offset_secs = time_raw
            .parse::<u64>()
            .map_err(|_| FraudCheckError::local("Time", "expected a whole number of seconds (0 or more)"))?;
        let amount = parse_decimal("Amount", required("Amount", &self.amount)?)?;

        let mut features = [0.0; PCA_FEATURE_COUNT];
        for (index, raw) in self.features.iter().enumerate() {
            features[index] = match raw.trim() {
                "" => 0.0,
                value => parse_decimal(&format!("V{}", index + 1), value)?,
            };
        }

        Ok(CreditCardRecord {
            time_offset_secs,
            amount,
            features,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Form {
    Banking(BankingForm),
    CreditCard(CreditCardForm),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collector {
    form: Form,
}

impl Collector {
    pub fn new(mode: Mode) -> Self {
        Self::at(mode, Utc::now().naive_utc())
    }

    /// Same as [`Collector::new`] with an explicit clock for the banking
    /// timestamp default.
    pub fn at(mode: Mode, now: NaiveDateTime) -> Self {
        let form = match mode {
            Mode::Banking => Form::Banking(BankingForm::with_timestamp(now)),
            Mode::CreditCard => Form::CreditCard(CreditCardForm::default()),
        };
        Self { form }
    }

    pub fn mode(&self) -> Mode {
        match self.form {
            Form::Banking(_) => Mode::Banking,
            Form::CreditCard(_) => Mode::CreditCard,
        }
    }

    /// Selecting a different mode drops every field of the old one.
    /// Re-selecting the current mode keeps the form as it is.
    pub fn switch_mode(&mut self, mode: Mode) {
        if mode != self.mode() {
            *self = Collector::new(mode);
        }
    }

    pub fn set_field(&mut self, name: &str, value: &str) -> CheckResult<()> {
        let name = name.trim();
        let mode = self.mode();
        let slot = match &mut self.form {
            Form::Banking(form) => match BankingForm::FIELDS
                .iter()
                .position(|field| field.eq_ignore_ascii_case(name))
            {
                Some(index) => Some(form.slot(index)),
                None => None,
            },
            Form::CreditCard(form) => form.slot(name),
        };

        match slot {
            Some(slot) => {
                *slot = value.trim().to_string();
                Ok(())
            }
            None => Err(FraudCheckError::local(
                name,
                format!("not a field of the {} form", mode.label()),
            )),
        }
    }

    pub fn apply_preset(&mut self, preset: Preset) -> CheckResult<()> {
        match &mut self.form {
            Form::CreditCard(form) => {
                *form = CreditCardForm::from_preset(preset);
                Ok(())
            }
            Form::Banking(_) => Err(FraudCheckError::local(
                "preset",
                "sample presets only exist for credit card mode",
            )),
        }
    }

    /// Field names and current raw values, in form order.
    pub fn fields(&self) -> Vec<(String, String)> {
        match &self.form {
            Form::Banking(form) => BankingForm::FIELDS
                .iter()
                .zip(form.values())
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            Form::CreditCard(form) => {
                let mut fields = vec![
                    ("Time".to_string(), form.time.clone()),
                    ("Amount".to_string(), form.amount.clone()),
                ];
                fields.extend(
                    form.features
                        .iter()
                        .enumerate()
                        .map(|(index, value)| (format!("V{}", index + 1), value.clone())),
                );
                fields
            }
        }
    }

    pub fn collect(&self) -> CheckResult<TransactionRecord> {
        match &self.form {
            Form::Banking(form) => form.collect().map(TransactionRecord::Banking),
            Form::CreditCard(form) => form.collect().map(TransactionRecord::CreditCard),
        }
    }
}

/// Rewrites a `datetime-local` style value into `YYYY-MM-DD HH:MM:SS`.
pub fn normalize_timestamp(raw: &str) -> CheckResult<String> {
    let raw = raw.trim();
    const ACCEPTED: [&str; 4] = [
        INPUT_TIMESTAMP_FORMAT,
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        WIRE_TIMESTAMP_FORMAT,
    ];

    ACCEPTED
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|parsed| parsed.format(WIRE_TIMESTAMP_FORMAT).to_string())
        .ok_or_else(|| {
            FraudCheckError::local("Timestamp", format!("expected YYYY-MM-DDTHH:MM, got {raw:?}"))
        })
}

fn required<'a>(field: &str, raw: &'a str) -> CheckResult<&'a str> {
    match raw.trim() {
        "" => Err(FraudCheckError::local(field, "is required")),
        value => Ok(value),
    }
}

fn parse_decimal(field: &str, raw: &str) -> CheckResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| FraudCheckError::local(field, format!("expected a number, got {raw:?}")))
}

fn parse_count(field: &str, raw: &str) -> CheckResult<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| FraudCheckError::local(field, format!("expected a whole number (0 or more), got {raw:?}")))
}

fn parse_flag(field: &str, raw: &str) -> CheckResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "0" | "false" | "no" => Ok(false),
        "1" | "true" | "yes" => Ok(true),
        other => Err(FraudCheckError::local(field, format!("expected 0 or 1, got {other:?}"))),
    }
}

const NORMAL_SAMPLE: [&str; PCA_FEATURE_COUNT] = [
    "0.45", "0.62", "-0.22", "0.72", "0.28", "0.52", "-0.28", "0.42", "0.22", "0.55", "0.38",
    "0.22", "-0.22", "0.48", "0.28", "0.45", "-0.28", "0.28", "0.22", "0.28", "0.45", "0.28",
    "0.22", "0.28", "0.22", "0.28", "0.22", "0.22",
];

const FRAUD_SAMPLE: [&str; PCA_FEATURE_COUNT] = [
    "-0.75", "0.85", "0.12", "0.58", "-0.12", "0.32", "0.12", "0.05", "-0.18", "0.95", "0.68",
    "-1.15", "0.32", "-2.15", "0.48", "-0.58", "-1.28", "-0.42", "0.18", "0.08", "0.25", "0.38",
    "-0.08", "-0.28", "0.25", "-0.38", "0.02", "0.02",
];

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(12, 5, 0)
            .unwrap()
    }

    fn is_wire_timestamp(value: &str) -> bool {
        let bytes = value.as_bytes();
        bytes.len() == 19
            && bytes.iter().enumerate().all(|(i, b)| match i {
                4 | 7 => *b == b'-',
                10 => *b == b' ',
                13 | 16 => *b == b':',
                _ => b.is_ascii_digit(),
            })
    }

    #[test]
    fn banking_defaults_match_dashboard() {
        let collector = Collector::at(Mode::Banking, noon());
        let fields: std::collections::HashMap<_, _> = collector.fields().into_iter().collect();

        assert_eq!(fields["Daily_Transaction_Count"], "1");
        assert_eq!(fields["Card_Age"], "100");
        assert_eq!(fields["IP_Address_Flag"], "0");
        assert_eq!(fields["Transaction_Type"], "POS");
        assert_eq!(fields["Timestamp"], "2026-03-14T12:05");
        assert_eq!(fields["Transaction_Amount"], "");
    }

    #[test]
    fn banking_timestamp_gains_seconds() {
        let mut collector = Collector::at(Mode::Banking, noon());
        collector.set_field("Transaction_Amount", "250").unwrap();
        collector.set_field("Account_Balance", "1200").unwrap();

        let TransactionRecord::Banking(record) = collector.collect().unwrap() else {
            panic!("expected a banking record");
        };
        assert_eq!(record.timestamp, "2026-03-14 12:05:00");
        assert_eq!(record.avg_amount_7d, 250.0);
        assert!(!record.suspicious_ip);
    }

    #[test]
    fn every_accepted_timestamp_lands_in_wire_format() {
        for raw in [
            "2026-01-02T03:04",
            "2026-01-02T03:04:59",
            "2026-01-02 03:04",
            "2026-01-02 03:04:05",
            " 2026-12-31T23:59 ",
        ] {
            let wire = normalize_timestamp(raw).unwrap();
            assert!(is_wire_timestamp(&wire), "{raw} -> {wire}");
        }
        assert!(normalize_timestamp("yesterday").is_err());
        assert!(normalize_timestamp("2026-13-02T03:04").is_err());
    }

    #[test]
    fn missing_required_fields_block_collect() {
        let mut collector = Collector::at(Mode::Banking, noon());
        collector.set_field("Transaction_Amount", "10").unwrap();
        let err = collector.collect().unwrap_err();
        assert!(matches!(err, FraudCheckError::LocalValidation { ref field, .. } if field == "Account_Balance"));

        let mut collector = Collector::new(Mode::CreditCard);
        collector.set_field("Time", "").unwrap();
        collector.set_field("Amount", "10").unwrap();
        assert!(collector.collect().is_err());
    }

    #[test]
    fn counts_reject_negative_values() {
        let mut collector = Collector::at(Mode::Banking, noon());
        collector.set_field("Transaction_Amount", "10").unwrap();
        collector.set_field("Account_Balance", "10").unwrap();
        collector.set_field("card_age", "-3").unwrap();
        assert!(collector.collect().is_err());
    }

    #[test]
    fn pca_features_accept_negative_decimals() {
        let mut collector = Collector::new(Mode::CreditCard);
        collector.set_field("Amount", "12.5").unwrap();
        collector.set_field("V14", "-2.15").unwrap();

        let TransactionRecord::CreditCard(record) = collector.collect().unwrap() else {
            panic!("expected a credit card record");
        };
        assert_eq!(record.features[13], -2.15);
        assert_eq!(record.features[0], 0.0);
        assert_eq!(record.time_offset_secs, 0);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut collector = Collector::new(Mode::CreditCard);
        assert!(collector.set_field("V29", "1").is_err());
        assert!(collector.set_field("Account_Balance", "1").is_err());
    }

    #[test]
    fn switching_mode_drops_previous_fields() {
        let mut collector = Collector::at(Mode::Banking, noon());
        collector.set_field("Transaction_Amount", "999").unwrap();
        collector.set_field("Account_Balance", "1").unwrap();

        collector.switch_mode(Mode::CreditCard);
        assert_eq!(collector.mode(), Mode::CreditCard);
        assert!(collector.fields().iter().all(|(name, _)| !name.starts_with("Transaction_")));

        collector.switch_mode(Mode::Banking);
        let fields: std::collections::HashMap<_, _> = collector.fields().into_iter().collect();
        assert_eq!(fields["Transaction_Amount"], "");
        assert_eq!(fields["Account_Balance"], "");
    }

    #[test]
    fn reselecting_same_mode_keeps_edits() {
        let mut collector = Collector::new(Mode::CreditCard);
        collector.set_field("Amount", "42").unwrap();
        collector.switch_mode(Mode::CreditCard);
        assert!(collector.collect().is_ok());
    }

    #[test]
    fn presets_fill_credit_card_form_only() {
        let mut collector = Collector::new(Mode::CreditCard);
        collector.apply_preset(Preset::Fraud).unwrap();
        let TransactionRecord::CreditCard(record) = collector.collect().unwrap() else {
            panic!("expected a credit card record");
        };
        assert_eq!(record.time_offset_secs, 68000);
        assert_eq!(record.amount, 225.0);
        assert_eq!(record.features[13], -2.15);

        let mut banking = Collector::new(Mode::Banking);
        assert!(banking.apply_preset(Preset::Normal).is_err());
    }
}
