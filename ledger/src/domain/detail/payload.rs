//! Typed view of a detailed activity payload.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::records::{parse_timestamp, value_as_i64};

/// Scalar columns of one detailed activity.
///
/// Field names follow the detail store columns; durations are seconds and
/// distances metres as delivered by the API.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivitySummary {
    pub name: Option<String>,
    pub activity_type: Option<String>,
    pub sport_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub start_date_local: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub utc_offset_seconds: Option<i32>,
    pub moving_time_seconds: Option<i32>,
    pub elapsed_time_seconds: Option<i32>,
    pub distance_m: Option<f64>,
    pub total_elevation_gain: Option<f64>,
    pub elev_high: Option<f64>,
    pub elev_low: Option<f64>,
    pub average_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub average_cadence: Option<f64>,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    pub average_watts: Option<f64>,
    pub max_watts: Option<f64>,
    pub device_watts: Option<bool>,
    pub calories: Option<f64>,
    pub commute: Option<bool>,
    pub trainer: Option<bool>,
    pub manual: Option<bool>,
    pub is_private: Option<bool>,
    pub gear_id: Option<String>,
    pub device_name: Option<String>,
    pub description: Option<String>,
    pub has_kudoed: Option<bool>,
    pub kudos_count: Option<i32>,
    pub comment_count: Option<i32>,
    pub photo_count: Option<i32>,
    pub map_summary_polyline: Option<String>,
}

/// One distance split; `index` is 1-based in delivery order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Split {
    pub index: i32,
    pub distance_m: Option<f64>,
    pub elapsed_time_seconds: Option<i32>,
    pub moving_time_seconds: Option<i32>,
    pub average_speed: Option<f64>,
    pub elevation_difference: Option<f64>,
    pub pace_zone: Option<i32>,
}

/// One ranked segment effort.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentEffort {
    pub effort_id: i64,
    pub segment_id: Option<i64>,
    pub name: Option<String>,
    pub elapsed_time_seconds: Option<i32>,
    pub moving_time_seconds: Option<i32>,
    pub distance_m: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub pr_rank: Option<i32>,
    pub kom_rank: Option<i32>,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
}

/// A detail record and its owned child collections.
///
/// Each child collection is `None` when the payload carried no key (or a
/// null) for it, meaning "leave stored children alone", and `Some` when the
/// payload delivered a list, including an empty one, meaning "replace stored
/// children with exactly these".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetailRecord {
    /// Primary identifier.
    pub activity_id: i64,
    /// Scalar columns.
    pub summary: ActivitySummary,
    /// Kilometre splits.
    pub splits_metric: Option<Vec<Split>>,
    /// Mile splits.
    pub splits_standard: Option<Vec<Split>>,
    /// Segment efforts; entries without an effort id are dropped.
    pub segment_efforts: Option<Vec<SegmentEffort>>,
}

/// Reasons a payload cannot become a [`DetailRecord`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetailPayloadError {
    /// The payload was not a JSON object.
    #[error("detail payload is not an object")]
    NotAnObject,
    /// The payload had no integral `id`.
    #[error("detail payload has no integral id")]
    MissingId,
}

impl DetailRecord {
    /// Build a record from a raw detail payload.
    ///
    /// # Errors
    ///
    /// Returns [`DetailPayloadError`] when the payload is not an object or has
    /// no integral primary identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use ledger::domain::detail::DetailRecord;
    /// use serde_json::json;
    ///
    /// let record = DetailRecord::from_payload(&json!({
    ///     "id": 7,
    ///     "name": "Lunch Run",
    ///     "splits_metric": [],
    /// }))?;
    /// assert_eq!(record.activity_id, 7);
    /// assert_eq!(record.splits_metric, Some(vec![]));
    /// assert_eq!(record.segment_efforts, None);
    /// # Ok::<(), ledger::domain::detail::DetailPayloadError>(())
    /// ```
    pub fn from_payload(payload: &Value) -> Result<Self, DetailPayloadError> {
        let object = payload.as_object().ok_or(DetailPayloadError::NotAnObject)?;
        let activity_id = object
            .get("id")
            .and_then(value_as_i64)
            .ok_or(DetailPayloadError::MissingId)?;

        Ok(Self {
            activity_id,
            summary: summary_from(payload),
            splits_metric: child_list(payload, "splits_metric")
                .map(|items| items.iter().zip(1..).map(split_from).collect()),
            splits_standard: child_list(payload, "splits_standard")
                .map(|items| items.iter().zip(1..).map(split_from).collect()),
            segment_efforts: child_list(payload, "segment_efforts")
                .map(|items| items.iter().filter_map(effort_from).collect()),
        })
    }
}

fn child_list<'a>(payload: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    payload.get(key).and_then(Value::as_array)
}

fn summary_from(payload: &Value) -> ActivitySummary {
    ActivitySummary {
        name: text(payload, "name"),
        activity_type: text(payload, "type"),
        sport_type: text(payload, "sport_type"),
        start_date: timestamp(payload, "start_date"),
        start_date_local: timestamp(payload, "start_date_local"),
        timezone: text(payload, "timezone"),
        utc_offset_seconds: int(payload, "utc_offset"),
        moving_time_seconds: int(payload, "moving_time"),
        elapsed_time_seconds: int(payload, "elapsed_time"),
        distance_m: float(payload, "distance"),
        total_elevation_gain: float(payload, "total_elevation_gain"),
        elev_high: float(payload, "elev_high"),
        elev_low: float(payload, "elev_low"),
        average_speed: float(payload, "average_speed"),
        max_speed: float(payload, "max_speed"),
        average_cadence: float(payload, "average_cadence"),
        average_heartrate: float(payload, "average_heartrate"),
        max_heartrate: float(payload, "max_heartrate"),
        average_watts: float(payload, "average_watts"),
        max_watts: float(payload, "max_watts"),
        device_watts: flag(payload, "device_watts"),
        calories: float(payload, "calories"),
        commute: flag(payload, "commute"),
        trainer: flag(payload, "trainer"),
        manual: flag(payload, "manual"),
        is_private: flag(payload, "private"),
        gear_id: text(payload, "gear_id"),
        device_name: text(payload, "device_name"),
        description: text(payload, "description"),
        has_kudoed: flag(payload, "has_kudoed"),
        kudos_count: int(payload, "kudos_count"),
        comment_count: int(payload, "comment_count"),
        photo_count: int(payload, "total_photo_count").or_else(|| int(payload, "photo_count")),
        map_summary_polyline: payload
            .get("map")
            .and_then(|map| text(map, "summary_polyline")),
    }
}

fn split_from((item, index): (&Value, i32)) -> Split {
    Split {
        index,
        distance_m: float(item, "distance"),
        elapsed_time_seconds: int(item, "elapsed_time"),
        moving_time_seconds: int(item, "moving_time"),
        average_speed: float(item, "average_speed"),
        elevation_difference: float(item, "elevation_difference"),
        pace_zone: int(item, "pace_zone"),
    }
}

fn effort_from(item: &Value) -> Option<SegmentEffort> {
    let effort_id = item.get("id").and_then(value_as_i64)?;
    let segment = item.get("segment");
    Some(SegmentEffort {
        effort_id,
        segment_id: segment.and_then(|s| s.get("id")).and_then(value_as_i64),
        name: text(item, "name").or_else(|| segment.and_then(|s| text(s, "name"))),
        elapsed_time_seconds: int(item, "elapsed_time"),
        moving_time_seconds: int(item, "moving_time"),
        distance_m: float(item, "distance"),
        start_date: timestamp(item, "start_date"),
        pr_rank: int(item, "pr_rank"),
        kom_rank: int(item, "kom_rank"),
        average_heartrate: float(item, "average_heartrate"),
        max_heartrate: float(item, "max_heartrate"),
    })
}

fn text(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn float(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

/// Integer column; the API sends some counters (`utc_offset`) as floats.
fn int(value: &Value, key: &str) -> Option<i32> {
    let number = value.get(key)?;
    match number.as_i64() {
        Some(raw) => i32::try_from(raw).ok(),
        None => number.as_f64().and_then(integral_i32),
    }
}

fn integral_i32(raw: f64) -> Option<i32> {
    let in_range = (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&raw);
    (in_range && raw.fract() == 0.0).then(|| raw as i32)
}

fn flag(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

fn timestamp(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    value.get(key).and_then(parse_timestamp)
}
