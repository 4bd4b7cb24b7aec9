use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the tierset binary.
#[derive(Debug, Parser)]
#[command(name = "tierset", version, about = "Administer a tiered settings store")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "TIERSET_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the value stored under a key.
    Get(GetArgs),
    /// Store a JSON value under a key.
    Set(SetArgs),
    /// Store every entry of a JSON object in one transaction.
    #[command(name = "set-many")]
    SetMany(SetManyArgs),
    /// Delete a key and forget it from every cache tier.
    Remove(KeyArgs),
    /// List every stored setting.
    List,
    /// List settings whose key matches a SQL LIKE pattern.
    Search(SearchArgs),
    /// Cache maintenance.
    Cache(CacheArgs),
    /// Resolve the configured preload keys and report the outcome.
    Preload(PreloadArgs),
    /// Apply migrations and create the configured table.
    Migrate,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    pub key: String,

    /// JSON value printed when the key has no value.
    #[arg(long, value_name = "JSON")]
    pub default: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SetArgs {
    pub key: String,

    /// JSON document; anything that does not parse is stored as a string.
    pub value: String,

    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SetManyArgs {
    /// JSON file holding an object of key/value pairs.
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Description applied to every entry.
    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    /// `%` matches any run of characters, `_` exactly one.
    pub pattern: String,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Forget one key, or every stored key when none is given.
    Clear(CacheClearArgs),
    /// Show whether a key is held by the shared tier.
    Status(KeyArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CacheClearArgs {
    pub key: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PreloadArgs {
    /// Resolve these keys instead of the configured list. Repeatable.
    #[arg(long = "key", value_name = "KEY")]
    pub keys: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the settings table name.
    #[arg(long = "database-table", value_name = "TABLE")]
    pub database_table: Option<String>,

    /// Override the cache key prefix.
    #[arg(long = "cache-prefix", value_name = "PREFIX")]
    pub cache_prefix: Option<String>,

    /// Override the shared cache backend (local|redis|disabled).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the Redis URL used by the redis backend.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub cache_redis_url: Option<String>,
}
