use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use huddle_core::generation::{GeminiGenerator, TextGenerator, UnavailableGenerator};
use huddle_core::projects::SqlProjectDirectory;
use huddle_core::revocation::{MemoryRevocationStore, RedisRevocationStore, RevocationStore};
use huddle_core::AppState;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use config::{Config, RevocationBackend};

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("huddle=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = Config::load(&args.config)?;

    ensure_database_dir(&config);
    let db = huddle_db::create_pool(&config.database.url, config.database.max_connections).await?;
    huddle_db::run_migrations(&db).await?;

    if let Some(project_id) = args.add_project {
        huddle_util::validation::validate_project_id(&project_id)
            .map_err(|e| anyhow::anyhow!("invalid project id '{project_id}': {e}"))?;
        let name = args.project_name.unwrap_or_else(|| project_id.clone());
        huddle_db::projects::insert_project(&db, &project_id, &name).await?;
        tracing::info!(%project_id, "project registered");
        return Ok(());
    }

    let revocation_store = build_revocation_store(&config).await?;
    let generator = build_generator(&config)?;

    let state = AppState::new(
        config.app_config(),
        Arc::new(SqlProjectDirectory::new(db)),
        revocation_store,
        generator,
    );

    let limits = state.limits.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            limits.prune();
        }
    });

    let app = huddle_api::build_router()
        .merge(huddle_ws::gateway_router())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        bind_address = %config.server.bind_address,
        database = %redact_database_url(&config.database.url),
        revocation = ?config.revocation.backend,
        "huddle server listening"
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down (ctrl-c)...");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

async fn build_revocation_store(config: &Config) -> Result<Arc<dyn RevocationStore>> {
    let store: Arc<dyn RevocationStore> = match config.revocation.backend {
        RevocationBackend::Memory => Arc::new(MemoryRevocationStore::new()),
        RevocationBackend::Redis => {
            let url = config.revocation.redis_url.as_deref().unwrap_or_default();
            Arc::new(RedisRevocationStore::connect(url).await?)
        }
    };
    Ok(store)
}

fn build_generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    match config.gemini_config() {
        Some(gemini) => {
            tracing::info!(model = %gemini.model, "assistant generation enabled");
            Ok(Arc::new(GeminiGenerator::new(gemini)?))
        }
        None => {
            tracing::warn!("no generation provider configured; assistant replies will use the fallback text");
            Ok(Arc::new(UnavailableGenerator))
        }
    }
}

/// Ensure the sqlite database's parent directory exists.
fn ensure_database_dir(config: &Config) {
    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
                }
            }
        }
    }
}

fn redact_database_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
