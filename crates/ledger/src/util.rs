//! Internal helpers for input normalization and model conversion.
//!
//! These utilities are **not** part of the public API.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::{LedgerError, ResultLedger};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultLedger<Uuid> {
    Uuid::parse_str(value).map_err(|_| LedgerError::Storage(format!("invalid {label} id: {value}")))
}

/// Strict `YYYY-MM-DD`.
pub(crate) fn parse_date(value: &str) -> ResultLedger<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| LedgerError::InvalidDate(format!("\"{value}\" is not a YYYY-MM-DD date")))
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (its UTC calendar date).
pub(crate) fn normalize_date(value: &str) -> ResultLedger<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| LedgerError::InvalidDate(format!("\"{trimmed}\" is not a valid date")))
}

/// Rejects dates whose UTC midnight lies more than `tolerance` after `now`.
pub(crate) fn ensure_not_future(
    date: NaiveDate,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> ResultLedger<()> {
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    if start - now > tolerance {
        return Err(LedgerError::InvalidDate(format!(
            "{date} is more than {}h in the future",
            tolerance.num_hours()
        )));
    }
    Ok(())
}

pub(crate) fn require_non_empty(value: &str, label: &str) -> ResultLedger<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidInput(format!(
            "{label} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_date_accepts_both_forms() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(normalize_date("2024-01-15").unwrap(), expected);
        assert_eq!(normalize_date("2024-01-15T23:30:00Z").unwrap(), expected);
        assert_eq!(normalize_date("2024-01-16T01:00:00+02:00").unwrap(), expected);
        assert!(matches!(
            normalize_date("15/01/2024"),
            Err(LedgerError::InvalidDate(_))
        ));
    }

    #[test]
    fn future_window_is_inclusive_of_tolerance() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();
        let day = Duration::hours(24);
        assert!(ensure_not_future(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(), now, day).is_ok());
        assert!(ensure_not_future(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), now, day).is_ok());
        assert!(ensure_not_future(NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(), now, day).is_err());
    }

    #[test]
    fn optional_text_drops_blanks() {
        assert_eq!(normalize_optional_text(Some("  ")), None);
        assert_eq!(normalize_optional_text(Some(" Acme ")), Some("Acme".to_string()));
        assert_eq!(normalize_optional_text(None), None);
    }
}
