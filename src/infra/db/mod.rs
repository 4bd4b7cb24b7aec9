//! Postgres-backed settings table.

mod settings;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, Transaction,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use super::error::InfraError;

pub const DEFAULT_CONNECTION: &str = "default";
pub const DEFAULT_TABLE: &str = "settings";

const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    table: Arc<str>,
    identity: Arc<str>,
}

impl PostgresRepositories {
    /// Binds the `settings` table of the `default` connection.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            table: Arc::from(DEFAULT_TABLE),
            identity: Arc::from(identity_for(DEFAULT_CONNECTION, DEFAULT_TABLE).as_str()),
        }
    }

    /// Binds another table. `table` may be schema-qualified (`schema.table`); each part
    /// must be a plain lower-case SQL identifier because it is interpolated into queries.
    pub fn with_table(mut self, connection: &str, table: &str) -> Result<Self, InfraError> {
        validate_table_name(table)?;
        if connection.is_empty() {
            return Err(InfraError::configuration("connection name must not be empty"));
        }
        self.table = Arc::from(table);
        self.identity = Arc::from(identity_for(connection, table).as_str());
        Ok(self)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Applies the bundled migrations, which create the default `settings` table.
    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    /// Creates the bound table when it does not exist yet. Used for tables the bundled
    /// migrations do not know about.
    pub async fn ensure_table(&self) -> Result<(), sqlx::Error> {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                id BIGSERIAL PRIMARY KEY, \
                key VARCHAR(191) NOT NULL UNIQUE, \
                description VARCHAR(255), \
                value JSONB, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\
            )",
            table = self.table
        );
        query(&statement).execute(self.pool()).await.map(|_| ())
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

fn identity_for(connection: &str, table: &str) -> String {
    format!("postgres.{connection}.{table}")
}

fn validate_table_name(table: &str) -> Result<(), InfraError> {
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|part| is_identifier(part)) {
        return Err(InfraError::configuration(format!(
            "`{table}` is not a valid table name"
        )));
    }
    Ok(())
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    part.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
