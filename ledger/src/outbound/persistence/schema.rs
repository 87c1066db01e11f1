//! Diesel table definitions for the SQLite warehouse.
//!
//! These definitions must match `migrations/` exactly. Timestamps are stored
//! as naive UTC values.

diesel::table! {
    /// One row per enriched activity.
    activity_details (activity_id) {
        activity_id -> BigInt,
        name -> Nullable<Text>,
        activity_type -> Nullable<Text>,
        sport_type -> Nullable<Text>,
        start_date -> Nullable<Timestamp>,
        start_date_local -> Nullable<Timestamp>,
        timezone -> Nullable<Text>,
        utc_offset_seconds -> Nullable<Integer>,
        moving_time_seconds -> Nullable<Integer>,
        elapsed_time_seconds -> Nullable<Integer>,
        distance_m -> Nullable<Double>,
        total_elevation_gain -> Nullable<Double>,
        elev_high -> Nullable<Double>,
        elev_low -> Nullable<Double>,
        average_speed -> Nullable<Double>,
        max_speed -> Nullable<Double>,
        average_cadence -> Nullable<Double>,
        average_heartrate -> Nullable<Double>,
        max_heartrate -> Nullable<Double>,
        average_watts -> Nullable<Double>,
        max_watts -> Nullable<Double>,
        device_watts -> Nullable<Bool>,
        calories -> Nullable<Double>,
        commute -> Nullable<Bool>,
        trainer -> Nullable<Bool>,
        manual -> Nullable<Bool>,
        is_private -> Nullable<Bool>,
        gear_id -> Nullable<Text>,
        device_name -> Nullable<Text>,
        description -> Nullable<Text>,
        has_kudoed -> Nullable<Bool>,
        kudos_count -> Nullable<Integer>,
        comment_count -> Nullable<Integer>,
        photo_count -> Nullable<Integer>,
        map_summary_polyline -> Nullable<Text>,
        fetched_at -> Timestamp,
    }
}

diesel::table! {
    /// Kilometre splits, owned by `activity_details`.
    activity_splits_metric (activity_id, split_index) {
        activity_id -> BigInt,
        split_index -> Integer,
        distance_m -> Nullable<Double>,
        elapsed_time_seconds -> Nullable<Integer>,
        moving_time_seconds -> Nullable<Integer>,
        average_speed -> Nullable<Double>,
        elevation_difference -> Nullable<Double>,
        pace_zone -> Nullable<Integer>,
    }
}

diesel::table! {
    /// Mile splits, owned by `activity_details`.
    activity_splits_standard (activity_id, split_index) {
        activity_id -> BigInt,
        split_index -> Integer,
        distance_m -> Nullable<Double>,
        elapsed_time_seconds -> Nullable<Integer>,
        moving_time_seconds -> Nullable<Integer>,
        average_speed -> Nullable<Double>,
        elevation_difference -> Nullable<Double>,
        pace_zone -> Nullable<Integer>,
    }
}

diesel::table! {
    /// Segment efforts, owned by `activity_details`.
    activity_segment_efforts (effort_id) {
        effort_id -> BigInt,
        activity_id -> BigInt,
        segment_id -> Nullable<BigInt>,
        name -> Nullable<Text>,
        elapsed_time_seconds -> Nullable<Integer>,
        moving_time_seconds -> Nullable<Integer>,
        distance_m -> Nullable<Double>,
        start_date -> Nullable<Timestamp>,
        pr_rank -> Nullable<Integer>,
        kom_rank -> Nullable<Integer>,
        average_heartrate -> Nullable<Double>,
        max_heartrate -> Nullable<Double>,
    }
}

diesel::table! {
    /// Physical canonical table behind the `activities` view.
    gold_activities (dedup_key) {
        dedup_key -> Text,
        cluster_ordinal -> BigInt,
        activity_id -> Nullable<BigInt>,
        athlete_id -> Nullable<BigInt>,
        start_date -> Nullable<Timestamp>,
        payload -> Text,
    }
}

diesel::table! {
    /// One row per successful canonical replacement.
    canonical_publications (publication_id) {
        publication_id -> Text,
        published_at -> Timestamp,
        dedup_key_rule -> Text,
        shard_count -> BigInt,
        row_count -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    activity_details,
    activity_splits_metric,
    activity_splits_standard,
    activity_segment_efforts,
);
