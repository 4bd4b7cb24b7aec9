//! In-process backing store.
//!
//! Emulates the column constraints of the Postgres table so that code exercised against
//! it fails in the same places it would in production.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    application::repos::{Projection, RepoError, SettingsRepo},
    cache::lock::{rw_read, rw_write},
    domain::entities::{NewSetting, SettingRecord},
    util::like::LikePattern,
};

const SOURCE: &str = "infra::memory";

#[derive(Debug)]
pub struct MemoryRepositories {
    identity: String,
    rows: RwLock<BTreeMap<String, SettingRecord>>,
}

impl MemoryRepositories {
    /// `identity` names this table in cache namespaces and must be unique per store.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.rows, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn apply(rows: &mut BTreeMap<String, SettingRecord>, entry: &NewSetting) -> SettingRecord {
    let now = OffsetDateTime::now_utc();
    let record = match rows.get(&entry.key) {
        Some(existing) => SettingRecord {
            key: entry.key.clone(),
            value: entry.value.clone(),
            description: entry
                .description
                .clone()
                .or_else(|| existing.description.clone()),
            created_at: existing.created_at,
            updated_at: now,
        },
        None => SettingRecord {
            key: entry.key.clone(),
            value: entry.value.clone(),
            description: entry.description.clone(),
            created_at: now,
            updated_at: now,
        },
    };
    rows.insert(record.key.clone(), record.clone());
    record
}

fn project(record: &SettingRecord, projection: Projection) -> SettingRecord {
    match projection {
        Projection::Full => record.clone(),
        Projection::KeysOnly => SettingRecord {
            key: record.key.clone(),
            value: Value::Null,
            description: None,
            created_at: record.created_at,
            updated_at: record.updated_at,
        },
    }
}

#[async_trait]
impl SettingsRepo for MemoryRepositories {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn find(&self, key: &str) -> Result<Option<SettingRecord>, RepoError> {
        Ok(rw_read(&self.rows, SOURCE, "find").get(key).cloned())
    }

    async fn upsert(&self, entry: &NewSetting) -> Result<SettingRecord, RepoError> {
        entry.validate()?;
        Ok(apply(&mut rw_write(&self.rows, SOURCE, "upsert"), entry))
    }

    async fn delete(&self, key: &str) -> Result<bool, RepoError> {
        Ok(rw_write(&self.rows, SOURCE, "delete").remove(key).is_some())
    }

    async fn bulk_upsert(&self, entries: &[NewSetting]) -> Result<Vec<SettingRecord>, RepoError> {
        let mut rows = rw_write(&self.rows, SOURCE, "bulk_upsert");
        let mut staged = rows.clone();
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            entry.validate()?;
            records.push(apply(&mut staged, entry));
        }
        *rows = staged;
        Ok(records)
    }

    async fn list_all(&self, projection: Projection) -> Result<Vec<SettingRecord>, RepoError> {
        let rows = rw_read(&self.rows, SOURCE, "list_all");
        Ok(rows.values().map(|record| project(record, projection)).collect())
    }

    async fn search(&self, pattern: &str) -> Result<Vec<SettingRecord>, RepoError> {
        let pattern = LikePattern::parse(pattern).map_err(|err| RepoError::InvalidInput {
            message: err.to_string(),
        })?;
        let rows = rw_read(&self.rows, SOURCE, "search");
        Ok(rows
            .values()
            .filter(|record| pattern.matches(&record.key))
            .cloned()
            .collect())
    }

    async fn is_ready(&self) -> Result<bool, RepoError> {
        Ok(true)
    }
}
