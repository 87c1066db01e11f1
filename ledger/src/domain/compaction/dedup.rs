//! Grouped rank-and-filter over landed rows.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::schema::{DedupKey, DiscoveredSchema};
use crate::domain::records::{
    INGESTION_COLUMN, RawRecord, START_COLUMN, UPDATED_COLUMN, column_i64, column_key_token,
    column_timestamp,
};

/// One landed row with its provenance.
#[derive(Debug, Clone, Copy)]
pub struct LandedRow<'a> {
    /// Name of the shard the row came from.
    pub shard: &'a str,
    /// Position of the row within its shard.
    pub ordinal: usize,
    /// Row contents.
    pub record: &'a RawRecord,
}

impl LandedRow<'_> {
    fn shard_token(&self) -> String {
        format!("shard={},row={}", self.shard, self.ordinal)
    }

    fn populated_fields(&self) -> usize {
        self.record.values().filter(|value| !value.is_null()).count()
    }

    fn coalesce_timestamp(&self, columns: &[&str]) -> Option<DateTime<Utc>> {
        columns
            .iter()
            .find_map(|column| column_timestamp(self.record, column))
    }
}

/// One comparison rule in the tie-break chain.
///
/// [`Ordering::Less`] means the left row ranks ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankRule {
    /// First non-null of the listed timestamp columns, newest first.
    Freshness(Vec<&'static str>),
    /// Count of non-null fields, richest first.
    Completeness,
    /// Landing timestamp, newest first.
    Ingestion,
    /// Shard name then row position, latest first.
    ShardIdentity,
}

impl RankRule {
    /// Compare two rows under this rule.
    pub fn compare(&self, left: &LandedRow<'_>, right: &LandedRow<'_>) -> Ordering {
        match self {
            Self::Freshness(columns) => desc_nulls_last(
                left.coalesce_timestamp(columns),
                right.coalesce_timestamp(columns),
            ),
            Self::Completeness => right.populated_fields().cmp(&left.populated_fields()),
            Self::Ingestion => desc_nulls_last(
                column_timestamp(left.record, INGESTION_COLUMN),
                column_timestamp(right.record, INGESTION_COLUMN),
            ),
            Self::ShardIdentity => right
                .shard
                .cmp(left.shard)
                .then_with(|| right.ordinal.cmp(&left.ordinal)),
        }
    }
}

/// Ordered comparator list selecting the authoritative row of a key group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieBreakChain(Vec<RankRule>);

impl TieBreakChain {
    /// Build the chain from the columns the schema actually carries.
    pub fn for_schema(schema: &DiscoveredSchema) -> Self {
        let freshness: Vec<&'static str> = [UPDATED_COLUMN, INGESTION_COLUMN, START_COLUMN]
            .into_iter()
            .filter(|column| schema.has(column))
            .collect();

        let mut rules = Vec::with_capacity(4);
        if !freshness.is_empty() {
            rules.push(RankRule::Freshness(freshness));
        }
        rules.push(RankRule::Completeness);
        if schema.has(INGESTION_COLUMN) {
            rules.push(RankRule::Ingestion);
        }
        rules.push(RankRule::ShardIdentity);
        Self(rules)
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[RankRule] {
        &self.0
    }

    /// Compare two rows, falling through rules until one decides.
    pub fn compare(&self, left: &LandedRow<'_>, right: &LandedRow<'_>) -> Ordering {
        self.0
            .iter()
            .map(|rule| rule.compare(left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Winning rows keyed by rendered dedup key.
#[derive(Debug)]
pub struct Selection<'a> {
    /// Winners in dedup-key order.
    pub winners: Vec<(String, LandedRow<'a>)>,
    /// Rows that fell back to shard identity because a key column was null.
    pub degraded_rows: usize,
}

/// Group rows by `key`, keep the top-ranked row of each group.
pub fn rank_and_select<'a>(
    rows: impl IntoIterator<Item = LandedRow<'a>>,
    key: DedupKey,
    chain: &TieBreakChain,
) -> Selection<'a> {
    let mut groups: BTreeMap<String, LandedRow<'a>> = BTreeMap::new();
    let mut degraded_rows = 0;

    for row in rows {
        let token = match key.token(row.record) {
            Some(token) => token,
            None => {
                if key != DedupKey::ShardIdentity {
                    degraded_rows += 1;
                }
                row.shard_token()
            }
        };
        match groups.entry(token) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => {
                if chain.compare(&row, slot.get()).is_lt() {
                    slot.insert(row);
                }
            }
        }
    }

    Selection {
        winners: groups.into_iter().collect(),
        degraded_rows,
    }
}

/// Sort winners by the clustering columns, ascending with nulls last, then
/// by dedup key.
pub fn cluster(winners: &mut [(String, LandedRow<'_>)], columns: &[&str]) {
    winners.sort_by(|(left_key, left), (right_key, right)| {
        columns
            .iter()
            .map(|column| cluster_compare(left.record, right.record, column))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| left_key.cmp(right_key))
    });
}

/// Project a winner onto the full column union, filling gaps with null.
pub fn widen(record: &RawRecord, schema: &DiscoveredSchema) -> RawRecord {
    schema
        .columns()
        .map(|column| {
            let value = record.get(column).cloned().unwrap_or(Value::Null);
            (column.to_owned(), value)
        })
        .collect()
}

fn cluster_compare(left: &RawRecord, right: &RawRecord, column: &str) -> Ordering {
    if column == START_COLUMN {
        return asc_nulls_last(
            column_timestamp(left, column),
            column_timestamp(right, column),
        );
    }
    asc_nulls_last(column_i64(left, column), column_i64(right, column)).then_with(|| {
        asc_nulls_last(
            column_key_token(left, column),
            column_key_token(right, column),
        )
    })
}

fn desc_nulls_last<T: Ord>(left: Option<T>, right: Option<T>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn asc_nulls_last<T: Ord>(left: Option<T>, right: Option<T>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
