use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    application::repos::{Projection, RepoError, SettingsRepo},
    domain::entities::{NewSetting, SettingRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

const COLUMNS: &str = "key, value, description, created_at, updated_at";
const KEY_COLUMNS: &str =
    "key, NULL::jsonb AS value, NULL::text AS description, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct SettingRow {
    key: String,
    value: Option<Value>,
    description: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<SettingRow> for SettingRecord {
    fn from(row: SettingRow) -> Self {
        Self {
            key: row.key,
            value: row.value.unwrap_or(Value::Null),
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {table} (key, value, description, created_at, updated_at) \
             VALUES ($1, $2, $3, now(), now()) \
             ON CONFLICT (key) DO UPDATE SET \
                value = EXCLUDED.value, \
                description = COALESCE(EXCLUDED.description, {table}.description), \
                updated_at = now() \
             RETURNING {COLUMNS}",
            table = self.table()
        )
    }
}

// `null` is stored as SQL NULL rather than a jsonb `null` document.
fn bind_value(value: &Value) -> Option<&Value> {
    (!value.is_null()).then_some(value)
}

#[async_trait]
impl SettingsRepo for PostgresRepositories {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn find(&self, key: &str) -> Result<Option<SettingRecord>, RepoError> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE key = $1", self.table());
        let row = sqlx::query_as::<_, SettingRow>(&sql)
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(SettingRecord::from))
    }

    async fn upsert(&self, entry: &NewSetting) -> Result<SettingRecord, RepoError> {
        entry.validate()?;

        let sql = self.upsert_sql();
        let row = sqlx::query_as::<_, SettingRow>(&sql)
            .bind(&entry.key)
            .bind(bind_value(&entry.value))
            .bind(entry.description.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(SettingRecord::from(row))
    }

    async fn delete(&self, key: &str) -> Result<bool, RepoError> {
        let sql = format!("DELETE FROM {} WHERE key = $1", self.table());
        let result = sqlx::query(&sql)
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn bulk_upsert(&self, entries: &[NewSetting]) -> Result<Vec<SettingRecord>, RepoError> {
        for entry in entries {
            entry.validate()?;
        }

        let sql = self.upsert_sql();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let row = sqlx::query_as::<_, SettingRow>(&sql)
                .bind(&entry.key)
                .bind(bind_value(&entry.value))
                .bind(entry.description.as_deref())
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            records.push(SettingRecord::from(row));
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(records)
    }

    async fn list_all(&self, projection: Projection) -> Result<Vec<SettingRecord>, RepoError> {
        let columns = match projection {
            Projection::Full => COLUMNS,
            Projection::KeysOnly => KEY_COLUMNS,
        };
        let sql = format!("SELECT {columns} FROM {} ORDER BY key", self.table());
        let rows = sqlx::query_as::<_, SettingRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SettingRecord::from).collect())
    }

    async fn search(&self, pattern: &str) -> Result<Vec<SettingRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE key LIKE $1 ORDER BY key",
            self.table()
        );
        let rows = sqlx::query_as::<_, SettingRow>(&sql)
            .bind(pattern)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SettingRecord::from).collect())
    }

    async fn is_ready(&self) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(self.table())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
