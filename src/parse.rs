//! Lenient parsing for dates and numbers typed into the form or carried in
//! a shared link. The strict functions report a [`ParseError`]; the `_or`
//! variants take the fallback from the caller and never fail.

use chrono::NaiveDate;
use tracing::debug;

use crate::error::ParseError;

pub fn parse_date(value: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ParseError::InvalidDate {
        value: value.to_string(),
    })
}

pub fn parse_number(value: &str) -> Result<f64, ParseError> {
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(ParseError::InvalidNumber {
            value: value.to_string(),
        }),
    }
}

pub fn date_or(value: &str, fallback: NaiveDate) -> NaiveDate {
    parse_date(value).unwrap_or_else(|e| {
        debug!(error = %e, %fallback, "using fallback date");
        fallback
    })
}

pub fn number_or(value: &str, fallback: f64) -> f64 {
    parse_number(value).unwrap_or_else(|e| {
        debug!(error = %e, fallback, "using fallback number");
        fallback
    })
}

/// Canonical decimal text for a quantity or price. Negative zero prints as `0`.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value != 0.0 {
        format!("{value}")
    } else {
        "0".to_string()
    }
}
