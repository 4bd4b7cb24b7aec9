//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CacheArgs, CacheClearArgs, CacheCommand, CliArgs, Command, GetArgs, KeyArgs, Overrides,
    PreloadArgs, SearchArgs, SetArgs, SetManyArgs,
};

use std::{
    num::{NonZeroU32, NonZeroU64},
    str::FromStr,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    cache::{PREFIX_DELIMITER, SEPARATOR},
    infra::db::{DEFAULT_CONNECTION, DEFAULT_TABLE},
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tierset";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CACHE_PREFIX: &str = "settings.";
const DEFAULT_SHARED_TIMEOUT_MS: u64 = 2000;
const DEFAULT_BACKING_TIMEOUT_MS: u64 = 5000;
const DEFAULT_PRELOAD_CONCURRENCY: u32 = 4;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub preload: PreloadSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    /// Logical connection name; part of the store identity.
    pub connection: String,
    pub table: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Local,
    Redis,
    Disabled,
}

impl CacheBackend {
    /// Whether entries are visible to other processes.
    pub fn is_cross_process(self) -> bool {
        matches!(self, Self::Redis)
    }
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "redis" => Ok(Self::Redis),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(format!(
                "unknown backend `{other}` (expected local, redis or disabled)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub prefix: String,
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub shared_timeout_ms: NonZeroU64,
    pub backing_timeout_ms: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct PreloadSettings {
    pub enabled: bool,
    pub keys: Vec<String>,
    pub concurrency: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("TIERSET")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("preload.keys")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    preload: RawPreloadSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(count) = overrides.database_max_connections {
            self.database.max_connections = Some(count);
        }
        if let Some(table) = overrides.database_table.as_ref() {
            self.database.table = Some(table.clone());
        }
        if let Some(prefix) = overrides.cache_prefix.as_ref() {
            self.cache.prefix = Some(prefix.clone());
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            preload,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let cache = build_cache_settings(cache)?;
        let preload = build_preload_settings(preload)?;

        Ok(Self {
            logging,
            database,
            cache,
            preload,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url)
        .map(|url| checked_url(url, "database.url", &["postgres", "postgresql"]))
        .transpose()?;

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let connection =
        non_blank(database.connection).unwrap_or_else(|| DEFAULT_CONNECTION.to_string());
    if connection.contains(SEPARATOR) {
        return Err(LoadError::invalid(
            "database.connection",
            format!("must not contain `{SEPARATOR}`"),
        ));
    }

    let table = non_blank(database.table).unwrap_or_else(|| DEFAULT_TABLE.to_string());

    Ok(DatabaseSettings {
        url,
        max_connections,
        connection,
        table,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let prefix = cache
        .prefix
        .unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string());
    if prefix.contains(SEPARATOR) || prefix.contains(PREFIX_DELIMITER) {
        return Err(LoadError::invalid(
            "cache.prefix",
            format!("must not contain `{SEPARATOR}` or `{PREFIX_DELIMITER}`"),
        ));
    }

    let backend = match cache.backend {
        Some(value) => CacheBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackend::Local,
    };

    let redis_url = non_blank(cache.redis_url)
        .map(|url| checked_url(url, "cache.redis_url", &["redis", "rediss", "redis+unix"]))
        .transpose()?;
    if backend == CacheBackend::Redis && redis_url.is_none() {
        return Err(LoadError::invalid(
            "cache.redis_url",
            "required when cache.backend is `redis`",
        ));
    }

    let shared_timeout_ms = non_zero_u64(
        cache.shared_timeout_ms.unwrap_or(DEFAULT_SHARED_TIMEOUT_MS),
        "cache.shared_timeout_ms",
    )?;
    let backing_timeout_ms = non_zero_u64(
        cache.backing_timeout_ms.unwrap_or(DEFAULT_BACKING_TIMEOUT_MS),
        "cache.backing_timeout_ms",
    )?;

    Ok(CacheSettings {
        prefix,
        backend,
        redis_url,
        shared_timeout_ms,
        backing_timeout_ms,
    })
}

fn build_preload_settings(preload: RawPreloadSettings) -> Result<PreloadSettings, LoadError> {
    let keys = preload
        .keys
        .into_iter()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect();

    let concurrency = non_zero_u32(
        preload
            .concurrency
            .unwrap_or(DEFAULT_PRELOAD_CONCURRENCY)
            .into(),
        "preload.concurrency",
    )?;

    Ok(PreloadSettings {
        enabled: preload.enabled.unwrap_or(true),
        keys,
        concurrency,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    connection: Option<String>,
    table: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    prefix: Option<String>,
    backend: Option<String>,
    redis_url: Option<String>,
    shared_timeout_ms: Option<u64>,
    backing_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPreloadSettings {
    enabled: Option<bool>,
    keys: Vec<String>,
    concurrency: Option<u32>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn checked_url(value: String, key: &'static str, schemes: &[&str]) -> Result<String, LoadError> {
    let parsed = Url::parse(&value)
        .map_err(|err| LoadError::invalid(key, format!("failed to parse: {err}")))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(LoadError::invalid(
            key,
            format!("unsupported scheme `{}`", parsed.scheme()),
        ));
    }
    Ok(value)
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
