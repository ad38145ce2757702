//! Deserializers for the loosely typed JSON the finance backend emits:
//! amounts as numbers, floats or strings, dates as plain dates or ISO timestamps.

use super::{Amount, DiscountType};
use chrono::{DateTime, Local, NaiveDate};
use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Int(i64),
    Float(f64),
    Text(String),
}

pub fn amount<'de, D>(deserializer: D) -> Result<Amount, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawAmount>::deserialize(deserializer)?;
    Ok(match raw {
        None => 0,
        Some(RawAmount::Int(value)) => value,
        Some(RawAmount::Float(value)) => round_amount(value),
        Some(RawAmount::Text(text)) => parse_amount_text(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid amount `{}`", text)))?,
    })
}

/// Blank text is zero. Thousands separators (`45,000`, `1,50,000`) are accepted.
fn parse_amount_text(text: &str) -> Option<Amount> {
    let digits: String = text.trim().chars().filter(|c| *c != ',').collect();
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse::<f64>().ok().map(round_amount)
}

fn round_amount(value: f64) -> Amount {
    if value.is_finite() {
        value.round() as Amount
    } else {
        0
    }
}

pub fn date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_date(&text).ok_or_else(|| de::Error::custom(format!("invalid date `{}`", text)))
}

pub fn optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(text) if !text.trim().is_empty() => parse_date(&text)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date `{}`", text))),
        _ => Ok(None),
    }
}

pub fn discount_type<'de, D>(deserializer: D) -> Result<DiscountType, D::Error>
where
    D: Deserializer<'de>,
{
    let text = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    let normalized: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "" | "none" => Ok(DiscountType::None),
        "onetime" => Ok(DiscountType::Onetime),
        "installment" | "installments" => Ok(DiscountType::Installments),
        _ => Err(de::Error::custom(format!("unknown discount type `{}`", text))),
    }
}

/// Timestamps are read in local time, which is how the admin picked the date.
fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Local).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Money {
        #[serde(default, deserialize_with = "amount")]
        value: Amount,
    }

    fn read(json: &str) -> Result<Amount, serde_json::Error> {
        serde_json::from_str::<Money>(json).map(|m| m.value)
    }

    #[test]
    fn test_amount_forms() {
        assert_eq!(read(r#"{"value": 45000}"#).unwrap(), 45000);
        assert_eq!(read(r#"{"value": 7250.5}"#).unwrap(), 7251);
        assert_eq!(read(r#"{"value": " 1200 "}"#).unwrap(), 1200);
        assert_eq!(read(r#"{"value": "45,000"}"#).unwrap(), 45000);
        assert_eq!(read(r#"{"value": "1,50,000.00"}"#).unwrap(), 150000);
    }

    #[test]
    fn test_only_missing_or_blank_amount_is_zero() {
        assert_eq!(read(r#"{}"#).unwrap(), 0);
        assert_eq!(read(r#"{"value": null}"#).unwrap(), 0);
        assert_eq!(read(r#"{"value": "  "}"#).unwrap(), 0);

        assert!(read(r#"{"value": "forty five"}"#).is_err());
        assert!(read(r#"{"value": "Rs 45000"}"#).is_err());
    }
}
