//! Header date parsing and deterministic record identifiers.
//!
//! Every record id is a pure function of (timestamp, entity name, subject
//! filter). Two extractions of the same underlying event must produce the
//! same id, so everything here is deterministic: no randomness, no clock
//! reads, no external state.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use thiserror::Error;

/// Raised when a `Date:` header (or a date-like record field) matches none
/// of the recognized formats. The offending message is skipped, not the
/// whole refresh unit.
#[derive(Debug, Error)]
#[error("unable to parse date: {0}")]
pub struct DateParseError(pub String);

/// Fallback formats tried after RFC 2822, in order. First success wins.
const FALLBACK_FORMATS: &[&str] = &[
    // 7 Apr 2022 13:08:55 +0530
    "%d %b %Y %H:%M:%S %z",
    // Tue Apr 7 13:08:55 2022 +0530
    "%a %b %d %H:%M:%S %Y %z",
    // 2022-04-07 13:08:55 +0530
    "%Y-%m-%d %H:%M:%S %z",
];

/// Parse a mail-header date string into a timezone-aware timestamp.
///
/// Attempts RFC 2822 first (the standard `Date:` header format), then the
/// fixed fallback list, then RFC 2822 with any trailing `(IST)`-style
/// comment stripped, and finally a naive parse defaulted to UTC.
pub fn parse_message_date(raw: &str) -> Result<DateTime<FixedOffset>, DateParseError> {
    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Ok(dt);
    }
    for fmt in FALLBACK_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt);
        }
    }
    // Some providers append a "(IST)" comment that strict parsers reject.
    if let Some(idx) = trimmed.find('(') {
        if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed[..idx].trim_end()) {
            return Ok(dt);
        }
    }
    // Last resort: no offset at all, default to UTC.
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
    }

    Err(DateParseError(trimmed.to_string()))
}

/// Strip every character that is not alphanumeric. Case is preserved:
/// "Fund A" and "FUND A" yield different ids, intentionally.
fn alnum_only(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Derive a stable content-based record id from an already-parsed timestamp.
///
/// Shape: `{YYYYMMDDHHMMSS}_{entity_clean}_{subject_clean}`. The timestamp
/// is formatted in UTC so records from different offset inputs collate
/// consistently. An entity that strips to nothing leaves an empty middle
/// segment; that is accepted and round-trips consistently.
pub fn record_id(timestamp: DateTime<Utc>, entity: &str, subject: &str) -> String {
    format!(
        "{}_{}_{}",
        timestamp.format("%Y%m%d%H%M%S"),
        alnum_only(entity),
        alnum_only(subject)
    )
}

/// Derive a record id from a string timestamp.
///
/// Accepts ISO 8601 (with offset, naive, or date-only, as statement tables
/// carry any of the three) and falls back to [`parse_message_date`].
pub fn record_id_from_str(
    timestamp: &str,
    entity: &str,
    subject: &str,
) -> Result<String, DateParseError> {
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        dt.with_timezone(&Utc)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S") {
        Utc.from_utc_datetime(&naive)
    } else if let Ok(date) = NaiveDate::parse_from_str(timestamp, "%Y-%m-%d") {
        Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
    } else {
        parse_message_date(timestamp)?.with_timezone(&Utc)
    };
    Ok(record_id(utc, entity, subject))
}
