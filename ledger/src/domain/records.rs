//! Loosely typed activity records as landed from the list endpoint.
//!
//! Landed batches carry whatever columns the API returned at the time, so
//! records stay as JSON objects until compaction or backlog selection needs a
//! specific field.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

/// One landed activity record keyed by column name.
pub type RawRecord = Map<String, Value>;

/// Activity identifier column.
pub const ID_COLUMN: &str = "id";
/// Owner (athlete) identifier column.
pub const OWNER_COLUMN: &str = "athlete_id";
/// Event start time column.
pub const START_COLUMN: &str = "start_date";
/// Time the record was landed by a pull run.
pub const INGESTION_COLUMN: &str = "ingestion_ts";
/// Optional server-side modification time.
pub const UPDATED_COLUMN: &str = "updated_at";

/// Format used when stamping `ingestion_ts` on landed records.
pub const INGESTION_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Parse a timestamp from the shapes seen in landed data.
///
/// Accepts RFC 3339 strings, naive `YYYY-MM-DD HH:MM:SS` strings (read as
/// UTC), and integral unix seconds. Anything else is treated as missing.
///
/// # Examples
///
/// ```
/// use ledger::domain::records::parse_timestamp;
/// use serde_json::json;
///
/// assert!(parse_timestamp(&json!("2024-03-01T10:00:00Z")).is_some());
/// assert!(parse_timestamp(&json!("2024-03-01 10:00:00")).is_some());
/// assert!(parse_timestamp(&json!("soon")).is_none());
/// ```
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_timestamp_str(raw),
        Value::Number(number) => number
            .as_i64()
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0)),
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
}

/// Read an integral identifier, accepting numeric strings.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

/// Read a column as a timestamp.
pub fn column_timestamp(record: &RawRecord, column: &str) -> Option<DateTime<Utc>> {
    record.get(column).and_then(parse_timestamp)
}

/// Read a column as an integral identifier.
pub fn column_i64(record: &RawRecord, column: &str) -> Option<i64> {
    record.get(column).and_then(value_as_i64)
}

/// Render a column value as a stable grouping token; `None` for null or absent.
pub fn column_key_token(record: &RawRecord, column: &str) -> Option<String> {
    match record.get(column)? {
        Value::Null => None,
        Value::String(raw) => Some(
            raw.trim()
                .parse::<i64>()
                .map_or_else(|_| raw.clone(), |parsed| parsed.to_string()),
        ),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::rfc3339(json!("2024-05-04T06:07:08Z"))]
    #[case::offset(json!("2024-05-04T08:07:08+02:00"))]
    #[case::naive_space(json!("2024-05-04 06:07:08"))]
    #[case::naive_t(json!("2024-05-04T06:07:08"))]
    #[case::unix(json!(1_714_802_828))]
    fn parses_supported_timestamp_shapes(#[case] value: Value) {
        let expected = Utc
            .with_ymd_and_hms(2024, 5, 4, 6, 7, 8)
            .single()
            .expect("valid instant");
        assert_eq!(parse_timestamp(&value), Some(expected));
    }

    #[rstest]
    #[case::null(json!(null))]
    #[case::garbage(json!("yesterday"))]
    #[case::boolean(json!(true))]
    fn unparseable_timestamps_read_as_missing(#[case] value: Value) {
        assert_eq!(parse_timestamp(&value), None);
    }

    #[test]
    fn key_tokens_normalise_numeric_strings() {
        let record: RawRecord = json!({"id": "42", "other": 42, "gone": null})
            .as_object()
            .cloned()
            .expect("object");
        assert_eq!(column_key_token(&record, "id").as_deref(), Some("42"));
        assert_eq!(column_key_token(&record, "other").as_deref(), Some("42"));
        assert_eq!(column_key_token(&record, "gone"), None);
        assert_eq!(column_key_token(&record, "missing"), None);
    }
}
