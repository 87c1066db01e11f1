//! Internal Diesel row structs.
//!
//! These types never leave the persistence layer; the repositories convert
//! them from domain records at the boundary.

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;

use super::schema::{
    activity_details, activity_segment_efforts, activity_splits_metric, activity_splits_standard,
    canonical_publications, gold_activities,
};
use crate::domain::detail::{DetailRecord, SegmentEffort, Split};
use crate::domain::ports::{CanonicalPublication, CanonicalRow};

fn naive(value: Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
    value.map(|value| value.naive_utc())
}

/// Insertable detail row; replaces any existing row for the activity.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = activity_details)]
pub(crate) struct NewDetailRow<'a> {
    pub activity_id: i64,
    pub name: Option<&'a str>,
    pub activity_type: Option<&'a str>,
    pub sport_type: Option<&'a str>,
    pub start_date: Option<NaiveDateTime>,
    pub start_date_local: Option<NaiveDateTime>,
    pub timezone: Option<&'a str>,
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
    pub gear_id: Option<&'a str>,
    pub device_name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub has_kudoed: Option<bool>,
    pub kudos_count: Option<i32>,
    pub comment_count: Option<i32>,
    pub photo_count: Option<i32>,
    pub map_summary_polyline: Option<&'a str>,
    pub fetched_at: NaiveDateTime,
}

impl<'a> NewDetailRow<'a> {
    pub(crate) fn new(record: &'a DetailRecord, fetched_at: DateTime<Utc>) -> Self {
        let summary = &record.summary;
        Self {
            activity_id: record.activity_id,
            name: summary.name.as_deref(),
            activity_type: summary.activity_type.as_deref(),
            sport_type: summary.sport_type.as_deref(),
            start_date: naive(summary.start_date),
            start_date_local: naive(summary.start_date_local),
            timezone: summary.timezone.as_deref(),
            utc_offset_seconds: summary.utc_offset_seconds,
            moving_time_seconds: summary.moving_time_seconds,
            elapsed_time_seconds: summary.elapsed_time_seconds,
            distance_m: summary.distance_m,
            total_elevation_gain: summary.total_elevation_gain,
            elev_high: summary.elev_high,
            elev_low: summary.elev_low,
            average_speed: summary.average_speed,
            max_speed: summary.max_speed,
            average_cadence: summary.average_cadence,
            average_heartrate: summary.average_heartrate,
            max_heartrate: summary.max_heartrate,
            average_watts: summary.average_watts,
            max_watts: summary.max_watts,
            device_watts: summary.device_watts,
            calories: summary.calories,
            commute: summary.commute,
            trainer: summary.trainer,
            manual: summary.manual,
            is_private: summary.is_private,
            gear_id: summary.gear_id.as_deref(),
            device_name: summary.device_name.as_deref(),
            description: summary.description.as_deref(),
            has_kudoed: summary.has_kudoed,
            kudos_count: summary.kudos_count,
            comment_count: summary.comment_count,
            photo_count: summary.photo_count,
            map_summary_polyline: summary.map_summary_polyline.as_deref(),
            fetched_at: fetched_at.naive_utc(),
        }
    }
}

/// Both split tables share one shape; only the target table differs.
macro_rules! split_row {
    ($name:ident, $table:ident) => {
        #[derive(Debug, Clone, Insertable)]
        #[diesel(table_name = $table)]
        pub(crate) struct $name {
            pub activity_id: i64,
            pub split_index: i32,
            pub distance_m: Option<f64>,
            pub elapsed_time_seconds: Option<i32>,
            pub moving_time_seconds: Option<i32>,
            pub average_speed: Option<f64>,
            pub elevation_difference: Option<f64>,
            pub pace_zone: Option<i32>,
        }

        impl $name {
            pub(crate) fn new(activity_id: i64, split: &Split) -> Self {
                Self {
                    activity_id,
                    split_index: split.index,
                    distance_m: split.distance_m,
                    elapsed_time_seconds: split.elapsed_time_seconds,
                    moving_time_seconds: split.moving_time_seconds,
                    average_speed: split.average_speed,
                    elevation_difference: split.elevation_difference,
                    pace_zone: split.pace_zone,
                }
            }
        }
    };
}

split_row!(NewMetricSplitRow, activity_splits_metric);
split_row!(NewStandardSplitRow, activity_splits_standard);

/// Insertable segment effort row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = activity_segment_efforts)]
pub(crate) struct NewSegmentEffortRow<'a> {
    pub effort_id: i64,
    pub activity_id: i64,
    pub segment_id: Option<i64>,
    pub name: Option<&'a str>,
    pub elapsed_time_seconds: Option<i32>,
    pub moving_time_seconds: Option<i32>,
    pub distance_m: Option<f64>,
    pub start_date: Option<NaiveDateTime>,
    pub pr_rank: Option<i32>,
    pub kom_rank: Option<i32>,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
}

impl<'a> NewSegmentEffortRow<'a> {
    pub(crate) fn new(activity_id: i64, effort: &'a SegmentEffort) -> Self {
        Self {
            effort_id: effort.effort_id,
            activity_id,
            segment_id: effort.segment_id,
            name: effort.name.as_deref(),
            elapsed_time_seconds: effort.elapsed_time_seconds,
            moving_time_seconds: effort.moving_time_seconds,
            distance_m: effort.distance_m,
            start_date: naive(effort.start_date),
            pr_rank: effort.pr_rank,
            kom_rank: effort.kom_rank,
            average_heartrate: effort.average_heartrate,
            max_heartrate: effort.max_heartrate,
        }
    }
}

/// Insertable canonical row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = gold_activities)]
pub(crate) struct NewCanonicalRow<'a> {
    pub dedup_key: &'a str,
    pub cluster_ordinal: i64,
    pub activity_id: Option<i64>,
    pub athlete_id: Option<i64>,
    pub start_date: Option<NaiveDateTime>,
    pub payload: &'a str,
}

impl<'a> From<&'a CanonicalRow> for NewCanonicalRow<'a> {
    fn from(row: &'a CanonicalRow) -> Self {
        Self {
            dedup_key: &row.dedup_key,
            cluster_ordinal: row.cluster_ordinal,
            activity_id: row.activity_id,
            athlete_id: row.athlete_id,
            start_date: naive(row.start_date),
            payload: &row.payload,
        }
    }
}

/// Candidate read back from the canonical table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = gold_activities)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct CandidateRow {
    pub activity_id: Option<i64>,
    pub start_date: Option<NaiveDateTime>,
}

/// Audit row written with every canonical replacement.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = canonical_publications)]
pub(crate) struct NewPublicationRow<'a> {
    pub publication_id: String,
    pub published_at: NaiveDateTime,
    pub dedup_key_rule: &'a str,
    pub shard_count: i64,
    pub row_count: i64,
}

impl<'a> NewPublicationRow<'a> {
    pub(crate) fn new(publication: &'a CanonicalPublication) -> Self {
        Self {
            publication_id: uuid::Uuid::new_v4().to_string(),
            published_at: publication.published_at.naive_utc(),
            dedup_key_rule: &publication.dedup_key_rule,
            shard_count: i64::try_from(publication.shard_count).unwrap_or(i64::MAX),
            row_count: i64::try_from(publication.rows.len()).unwrap_or(i64::MAX),
        }
    }
}
