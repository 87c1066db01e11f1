//! In-memory implementations of the storage ports.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::detail::DetailRecord;
use crate::domain::ports::{
    AnalyticStore, AnalyticStoreError, ArchivedPayload, CandidateActivity, CanonicalPublication,
    CredentialStore, CredentialStoreError, DetailArchive, DetailArchiveError, DetailRepository,
    DetailRepositoryError, Shard, ShardStore, ShardStoreError, StoredCredential, TableDirectory,
    TableDirectoryError,
};
use crate::domain::records::RawRecord;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("test store mutex poisoned"),
    }
}

/// Landing store held in memory.
#[derive(Default)]
pub struct InMemoryShardStore {
    shards: Mutex<BTreeMap<String, Vec<RawRecord>>>,
}

impl InMemoryShardStore {
    /// Seed a shard under an explicit name.
    pub fn insert(&self, name: &str, records: Vec<RawRecord>) {
        lock(&self.shards).insert(name.to_owned(), records);
    }

    /// Names of all landed shards.
    pub fn names(&self) -> Vec<String> {
        lock(&self.shards).keys().cloned().collect()
    }

    /// Records of one shard.
    pub fn records(&self, name: &str) -> Option<Vec<RawRecord>> {
        lock(&self.shards).get(name).cloned()
    }
}

impl ShardStore for InMemoryShardStore {
    fn write_shard(
        &self,
        owner: &str,
        fetched_at: DateTime<Utc>,
        records: &[RawRecord],
    ) -> Result<String, ShardStoreError> {
        let mut shards = lock(&self.shards);
        let stem = format!("activities_{owner}_{}", fetched_at.format("%Y%m%d%H%M%S"));
        let mut name = format!("{stem}.json");
        let mut suffix = 1;
        while shards.contains_key(&name) {
            name = format!("{stem}_{suffix}.json");
            suffix += 1;
        }
        shards.insert(name.clone(), records.to_vec());
        Ok(name)
    }

    fn list_shards(&self) -> Result<Vec<String>, ShardStoreError> {
        Ok(self.names())
    }

    fn read_shard(&self, name: &str) -> Result<Shard, ShardStoreError> {
        let records = self
            .records(name)
            .ok_or_else(|| ShardStoreError::io(name, "no such shard"))?;
        Ok(Shard {
            name: name.to_owned(),
            records,
        })
    }
}

type Parts = BTreeMap<String, Vec<u8>>;

/// Canonical directory held in memory, with rename fault injection.
#[derive(Default)]
pub struct InMemoryTableDirectory {
    tables: Mutex<BTreeMap<String, Parts>>,
    failing_renames: Mutex<Vec<(String, String)>>,
}

impl InMemoryTableDirectory {
    /// Fail every rename whose source starts with `from_prefix` and whose
    /// target is `to`.
    pub fn fail_rename(&self, from_prefix: &str, to: &str) {
        lock(&self.failing_renames).push((from_prefix.to_owned(), to.to_owned()));
    }

    /// Seed a table with parts.
    pub fn insert_table(&self, name: &str, parts: &[(&str, &[u8])]) {
        let parts = parts
            .iter()
            .map(|(part, bytes)| ((*part).to_owned(), bytes.to_vec()))
            .collect();
        lock(&self.tables).insert(name.to_owned(), parts);
    }

    /// Names of all top-level entries.
    pub fn table_names(&self) -> Vec<String> {
        lock(&self.tables).keys().cloned().collect()
    }

    /// Bytes of one part, if present.
    pub fn part(&self, table: &str, part: &str) -> Option<Vec<u8>> {
        lock(&self.tables)
            .get(table)
            .and_then(|parts| parts.get(part).cloned())
    }
}

impl TableDirectory for InMemoryTableDirectory {
    fn entries(&self) -> Result<Vec<String>, TableDirectoryError> {
        Ok(self.table_names())
    }

    fn exists(&self, name: &str) -> bool {
        lock(&self.tables).contains_key(name)
    }

    fn create_table(&self, name: &str) -> Result<(), TableDirectoryError> {
        let mut tables = lock(&self.tables);
        if tables.contains_key(name) {
            return Err(TableDirectoryError::io(name, "already exists"));
        }
        tables.insert(name.to_owned(), Parts::new());
        Ok(())
    }

    fn write_part(&self, table: &str, part: &str, bytes: &[u8]) -> Result<(), TableDirectoryError> {
        let mut tables = lock(&self.tables);
        let parts = tables
            .get_mut(table)
            .ok_or_else(|| TableDirectoryError::io(table, "no such table"))?;
        parts.insert(part.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), TableDirectoryError> {
        let injected = lock(&self.failing_renames)
            .iter()
            .any(|(prefix, target)| from.starts_with(prefix.as_str()) && to == target);
        if injected {
            return Err(TableDirectoryError::io(from, "injected rename failure"));
        }
        let mut tables = lock(&self.tables);
        if tables.contains_key(to) {
            return Err(TableDirectoryError::io(to, "target exists"));
        }
        let parts = tables
            .remove(from)
            .ok_or_else(|| TableDirectoryError::io(from, "no such entry"))?;
        tables.insert(to.to_owned(), parts);
        Ok(())
    }

    fn remove_all(&self, name: &str) -> Result<(), TableDirectoryError> {
        lock(&self.tables).remove(name);
        Ok(())
    }
}

/// Detail store held in memory with the same child replacement rules as the
/// SQL adapter.
#[derive(Default)]
pub struct InMemoryDetailRepository {
    details: Mutex<BTreeMap<i64, DetailRecord>>,
    upserts: Mutex<Vec<i64>>,
}

impl InMemoryDetailRepository {
    /// Mark activities as already enriched.
    pub fn preload(&self, ids: &[i64]) {
        let mut details = lock(&self.details);
        for &activity_id in ids {
            details.insert(
                activity_id,
                DetailRecord {
                    activity_id,
                    ..DetailRecord::default()
                },
            );
        }
    }

    /// Stored record for an activity.
    pub fn get(&self, activity_id: i64) -> Option<DetailRecord> {
        lock(&self.details).get(&activity_id).cloned()
    }

    /// Activity ids in upsert order.
    pub fn upserts(&self) -> Vec<i64> {
        lock(&self.upserts).clone()
    }
}

#[async_trait]
impl DetailRepository for InMemoryDetailRepository {
    async fn existing_ids(&self, candidates: &[i64]) -> Result<BTreeSet<i64>, DetailRepositoryError> {
        let details = lock(&self.details);
        Ok(candidates
            .iter()
            .copied()
            .filter(|id| details.contains_key(id))
            .collect())
    }

    async fn upsert_detail(
        &self,
        record: &DetailRecord,
        _fetched_at: DateTime<Utc>,
    ) -> Result<(), DetailRepositoryError> {
        let mut details = lock(&self.details);
        let previous = details.remove(&record.activity_id);
        let mut merged = record.clone();
        if let Some(previous) = previous {
            if merged.splits_metric.is_none() {
                merged.splits_metric = previous.splits_metric;
            }
            if merged.splits_standard.is_none() {
                merged.splits_standard = previous.splits_standard;
            }
            if merged.segment_efforts.is_none() {
                merged.segment_efforts = previous.segment_efforts;
            }
        }
        details.insert(record.activity_id, merged);
        lock(&self.upserts).push(record.activity_id);
        Ok(())
    }
}

/// Archive held in memory; entries keep insertion order.
#[derive(Default)]
pub struct InMemoryDetailArchive {
    entries: Mutex<Vec<ArchivedPayload>>,
}

impl InMemoryDetailArchive {
    /// Names of archived entries in insertion order.
    pub fn names(&self) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Seed an archived payload.
    pub fn insert(&self, name: &str, activity_id: i64, payload: Value) {
        lock(&self.entries).push(ArchivedPayload {
            activity_id,
            name: name.to_owned(),
            payload,
        });
    }
}

impl DetailArchive for InMemoryDetailArchive {
    fn archive(
        &self,
        owner: &str,
        activity_id: i64,
        fetched_at: DateTime<Utc>,
        payload: &Value,
    ) -> Result<String, DetailArchiveError> {
        let name = format!(
            "strava_detailed_activity_{owner}_{activity_id}_{}.json",
            fetched_at.format("%Y%m%d%H%M%S")
        );
        self.insert(&name, activity_id, payload.clone());
        Ok(name)
    }

    fn latest_payloads(&self) -> Result<Vec<ArchivedPayload>, DetailArchiveError> {
        let mut latest = BTreeMap::new();
        for entry in lock(&self.entries).iter() {
            latest.insert(entry.activity_id, entry.clone());
        }
        Ok(latest.into_values().collect())
    }
}

/// Analytic store held in memory.
#[derive(Default)]
pub struct InMemoryAnalyticStore {
    publication: Mutex<Option<CanonicalPublication>>,
    fail_next_replace: AtomicBool,
}

impl InMemoryAnalyticStore {
    /// Make the next `replace_canonical` call fail.
    pub fn fail_next_replace(&self) {
        self.fail_next_replace.store(true, Ordering::SeqCst);
    }

    /// The most recent publication.
    pub fn publication(&self) -> Option<CanonicalPublication> {
        lock(&self.publication).clone()
    }
}

#[async_trait]
impl AnalyticStore for InMemoryAnalyticStore {
    async fn replace_canonical(
        &self,
        publication: &CanonicalPublication,
    ) -> Result<(), AnalyticStoreError> {
        if self.fail_next_replace.swap(false, Ordering::SeqCst) {
            return Err(AnalyticStoreError::query("injected replace failure"));
        }
        *lock(&self.publication) = Some(publication.clone());
        Ok(())
    }

    async fn canonical_candidates(
        &self,
    ) -> Result<Option<Vec<CandidateActivity>>, AnalyticStoreError> {
        Ok(lock(&self.publication).as_ref().map(|publication| {
            publication
                .rows
                .iter()
                .filter_map(|row| {
                    row.activity_id.map(|activity_id| CandidateActivity {
                        activity_id,
                        start_date: row.start_date,
                    })
                })
                .collect()
        }))
    }
}

/// Credential store held in memory.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    current: Mutex<Option<StoredCredential>>,
    saves: Mutex<usize>,
}

impl InMemoryCredentialStore {
    /// Start with a stored credential.
    pub fn with(credential: StoredCredential) -> Self {
        Self {
            current: Mutex::new(Some(credential)),
            saves: Mutex::new(0),
        }
    }

    /// Number of saves so far.
    pub fn saves(&self) -> usize {
        *lock(&self.saves)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Option<StoredCredential> {
        lock(&self.current).clone()
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), CredentialStoreError> {
        *lock(&self.current) = Some(credential.clone());
        *lock(&self.saves) += 1;
        Ok(())
    }
}
