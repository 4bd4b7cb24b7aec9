use std::{process, sync::Arc};

use serde::Serialize;
use serde_json::{Value, json};
use tierset::{
    application::{
        error::{AppError, ErrorReport},
        preload::{PreloadConfig, Preloader},
        repos::SettingsRepo,
        settings::SettingsStore,
    },
    cache::{CacheConfig, SharedCache},
    config::{self, CacheBackend, CacheCommand, Command},
    infra::{
        db::{DEFAULT_TABLE, PostgresRepositories},
        error::InfraError,
        shared::{DisabledSharedCache, LocalSharedCache, RedisSharedCache},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = ErrorReport::from_error("tierset::main", error);
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?report.messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        Command::Migrate => run_migrate(&settings).await,
        command => {
            let store = init_store(&settings).await?;
            run_store_command(&store, &settings, command).await
        }
    }
}

async fn run_store_command(
    store: &SettingsStore,
    settings: &config::Settings,
    command: Command,
) -> Result<(), AppError> {
    if matches!(command, Command::Cache(_) | Command::Preload(_))
        && !settings.cache.backend.is_cross_process()
    {
        warn!(
            backend = ?settings.cache.backend,
            "shared cache tier is local to this process; the command has no effect on other processes"
        );
    }

    match command {
        Command::Get(args) => {
            let default = args.default.as_deref().map(parse_value);
            let value = match store.get(&args.key).await {
                Some(value) => value,
                None => default.unwrap_or(Value::Null),
            };
            emit(&json!({ "key": args.key, "value": value }))
        }
        Command::Set(args) => {
            let record = store
                .set(&args.key, parse_value(&args.value), args.description.as_deref())
                .await?;
            emit(&record)
        }
        Command::SetMany(args) => {
            let raw = tokio::fs::read_to_string(&args.file)
                .await
                .map_err(InfraError::from)?;
            let document: Value = serde_json::from_str(&raw).map_err(|err| {
                AppError::validation(format!("{} is not valid JSON: {err}", args.file.display()))
            })?;
            let Value::Object(entries) = document else {
                return Err(AppError::validation(format!(
                    "{} must contain a JSON object",
                    args.file.display()
                )));
            };

            let records = store
                .set_many(entries, args.description.as_deref())
                .await?;
            records.iter().try_for_each(emit)
        }
        Command::Remove(args) => {
            let removed = store.remove(&args.key).await?;
            emit(&json!({ "key": args.key, "removed": removed }))
        }
        Command::List => store.all().await?.iter().try_for_each(emit),
        Command::Search(args) => store.search(&args.pattern).await?.iter().try_for_each(emit),
        Command::Cache(args) => match args.command {
            CacheCommand::Clear(clear) => match clear.key {
                Some(key) => {
                    store.forget_cached(&key).await?;
                    emit(&json!({ "forgotten": [key] }))
                }
                None => {
                    let count = store.flush_cache().await?;
                    emit(&json!({ "forgotten": count }))
                }
            },
            CacheCommand::Status(args) => {
                let shared = store.is_shared_cached(&args.key).await?;
                emit(&json!({
                    "key": args.key,
                    "cache_key": store.cache_key(&args.key).render(),
                    "shared": shared,
                }))
            }
        },
        Command::Preload(args) => {
            let mut preload = PreloadConfig::from(&settings.preload);
            if !args.keys.is_empty() {
                preload.enabled = true;
                preload.keys = args.keys;
            }
            let report = Preloader::new(store.clone(), preload).run().await;
            emit(&json!({
                "loaded": report.loaded,
                "missing": report.missing,
                "failed": report.failed,
                "skipped": report.skipped,
            }))
        }
        Command::Migrate => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: &config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(settings).await?;

    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(InfraError::from)?;
    if repositories.table() != DEFAULT_TABLE {
        repositories.ensure_table().await.map_err(InfraError::from)?;
    }

    info!(table = repositories.table(), "settings schema is up to date");
    emit(&json!({ "migrated": repositories.table() }))
}

async fn init_repositories(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    let repositories = PostgresRepositories::new(pool)
        .with_table(&settings.database.connection, &settings.database.table)?;
    repositories
        .health_check()
        .await
        .map_err(InfraError::from)?;
    Ok(repositories)
}

async fn init_shared_cache(
    settings: &config::CacheSettings,
) -> Result<Arc<dyn SharedCache>, AppError> {
    let shared: Arc<dyn SharedCache> = match settings.backend {
        CacheBackend::Local => Arc::new(LocalSharedCache::new()),
        CacheBackend::Disabled => Arc::new(DisabledSharedCache),
        CacheBackend::Redis => {
            let url = settings
                .redis_url
                .as_deref()
                .ok_or_else(|| InfraError::configuration("cache.redis_url is not configured"))?;
            let cache = RedisSharedCache::connect(url)
                .await
                .map_err(InfraError::from)?;
            Arc::new(cache)
        }
    };
    Ok(shared)
}

async fn init_store(settings: &config::Settings) -> Result<SettingsStore, AppError> {
    let repositories = init_repositories(settings).await?;
    let shared = init_shared_cache(&settings.cache).await?;

    let repo: Arc<dyn SettingsRepo> = Arc::new(repositories);
    info!(
        identity = repo.identity(),
        shared = shared.backend(),
        "settings store ready"
    );
    let store = SettingsStore::new(repo, shared, CacheConfig::from(&settings.cache))?;
    Ok(store)
}

/// Values that are not valid JSON are taken as plain strings.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn emit<T: Serialize>(value: &T) -> Result<(), AppError> {
    let line = serde_json::to_string(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{line}");
    Ok(())
}
