//! Discovered schema and dedup key inference.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::ports::Shard;
use crate::domain::records::{ID_COLUMN, OWNER_COLUMN, RawRecord, START_COLUMN, column_key_token};

/// How widely a column appears across the shards of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnPresence {
    /// Every shard carries the column.
    All,
    /// Some shards carry the column.
    Partial,
    /// No shard carries the column.
    Absent,
}

/// Union of columns observed across all shards, computed once per run.
///
/// A column counts as present in a shard when any of its records has the key,
/// even with a null value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveredSchema {
    shard_count: usize,
    columns: BTreeMap<String, usize>,
}

impl DiscoveredSchema {
    /// Scan shards and record per-column shard coverage.
    pub fn discover(shards: &[Shard]) -> Self {
        let mut columns = BTreeMap::new();
        for shard in shards {
            let mut seen: Vec<&str> = shard
                .records
                .iter()
                .flat_map(|record| record.keys().map(String::as_str))
                .collect();
            seen.sort_unstable();
            seen.dedup();
            for column in seen {
                *columns.entry(column.to_owned()).or_insert(0) += 1;
            }
        }
        Self {
            shard_count: shards.len(),
            columns,
        }
    }

    /// Coverage of `column` across shards.
    pub fn presence(&self, column: &str) -> ColumnPresence {
        match self.columns.get(column) {
            None | Some(0) => ColumnPresence::Absent,
            Some(&count) if count >= self.shard_count => ColumnPresence::All,
            Some(_) => ColumnPresence::Partial,
        }
    }

    /// Whether any shard carries `column`.
    pub fn has(&self, column: &str) -> bool {
        self.presence(column) != ColumnPresence::Absent
    }

    /// All observed column names in sorted order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of shards scanned.
    pub const fn shard_count(&self) -> usize {
        self.shard_count
    }
}

/// Column combination identifying "the same logical record".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey {
    /// Owner plus record identifier.
    OwnerAndRecord,
    /// Record identifier alone.
    Record,
    /// Shard name plus row position; every row is its own group.
    ShardIdentity,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OwnerAndRecord => write!(f, "({OWNER_COLUMN}, {ID_COLUMN})"),
            Self::Record => write!(f, "({ID_COLUMN})"),
            Self::ShardIdentity => f.write_str("(shard, row)"),
        }
    }
}

impl DedupKey {
    /// Choose the strongest key the schema supports.
    ///
    /// The compound key needs the owner column in every shard; otherwise rows
    /// from shards without it would never meet their duplicates.
    pub fn infer(schema: &DiscoveredSchema) -> Self {
        if !schema.has(ID_COLUMN) {
            return Self::ShardIdentity;
        }
        if schema.presence(OWNER_COLUMN) == ColumnPresence::All {
            Self::OwnerAndRecord
        } else {
            Self::Record
        }
    }

    /// Render the grouping token for one row, or `None` when a key column is
    /// null and the row must fall back to shard identity.
    ///
    /// Tokens name their columns so they never collide with shard-identity
    /// tokens.
    pub fn token(self, record: &RawRecord) -> Option<String> {
        match self {
            Self::OwnerAndRecord => {
                let owner = column_key_token(record, OWNER_COLUMN)?;
                let id = column_key_token(record, ID_COLUMN)?;
                Some(format!("{OWNER_COLUMN}={owner},{ID_COLUMN}={id}"))
            }
            Self::Record => {
                column_key_token(record, ID_COLUMN).map(|id| format!("{ID_COLUMN}={id}"))
            }
            Self::ShardIdentity => None,
        }
    }
}

/// Column order used to cluster the materialized table.
pub fn clustering_columns(schema: &DiscoveredSchema) -> Vec<&'static str> {
    let mut columns = Vec::new();
    if schema.has(OWNER_COLUMN) {
        columns.push(OWNER_COLUMN);
    }
    if schema.has(START_COLUMN) {
        columns.push(START_COLUMN);
    } else if schema.has(ID_COLUMN) {
        columns.push(ID_COLUMN);
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use rstest::rstest;
    use serde_json::json;

    fn shard(name: &str, records: Vec<serde_json::Value>) -> Shard {
        Shard {
            name: name.to_owned(),
            records: records.into_iter().map(record).collect(),
        }
    }

    #[test]
    fn presence_counts_shards_not_rows() {
        let shards = vec![
            shard("a", vec![json!({"id": 1, "athlete_id": 3}), json!({"id": 2})]),
            shard("b", vec![json!({"id": 3, "kudos_count": null})]),
        ];
        let schema = DiscoveredSchema::discover(&shards);

        assert_eq!(schema.presence("id"), ColumnPresence::All);
        assert_eq!(schema.presence("athlete_id"), ColumnPresence::Partial);
        assert_eq!(schema.presence("kudos_count"), ColumnPresence::Partial);
        assert_eq!(schema.presence("name"), ColumnPresence::Absent);
        assert_eq!(schema.shard_count(), 2);
    }

    #[rstest]
    #[case::compound(vec![json!({"id": 1, "athlete_id": 2})], DedupKey::OwnerAndRecord)]
    #[case::owner_partial(
        vec![json!({"id": 1, "athlete_id": 2}), json!({"id": 1})],
        DedupKey::Record
    )]
    #[case::id_only(vec![json!({"id": 1})], DedupKey::Record)]
    #[case::no_id(vec![json!({"name": "x", "athlete_id": 2})], DedupKey::ShardIdentity)]
    fn infers_strongest_supported_key(
        #[case] per_shard: Vec<serde_json::Value>,
        #[case] expected: DedupKey,
    ) {
        let shards: Vec<Shard> = per_shard
            .into_iter()
            .enumerate()
            .map(|(index, value)| shard(&format!("s{index}"), vec![value]))
            .collect();
        assert_eq!(DedupKey::infer(&DiscoveredSchema::discover(&shards)), expected);
    }

    #[test]
    fn null_key_columns_yield_no_token() {
        let row = record(json!({"id": null, "athlete_id": 4}));
        assert_eq!(DedupKey::Record.token(&row), None);
        assert_eq!(DedupKey::OwnerAndRecord.token(&row), None);
        let keyed = record(json!({"id": "42", "athlete_id": 4}));
        assert_eq!(DedupKey::OwnerAndRecord.token(&keyed).as_deref(), Some("athlete_id=4,id=42"));
    }

    #[test]
    fn clustering_prefers_owner_then_time() {
        let with_all = DiscoveredSchema::discover(&[shard(
            "a",
            vec![json!({"id": 1, "athlete_id": 2, "start_date": "2024-01-01T00:00:00Z"})],
        )]);
        assert_eq!(clustering_columns(&with_all), vec!["athlete_id", "start_date"]);

        let id_only = DiscoveredSchema::discover(&[shard("a", vec![json!({"id": 1})])]);
        assert_eq!(clustering_columns(&id_only), vec!["id"]);
    }
}
