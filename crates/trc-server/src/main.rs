#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trc_apply::GithubAdapter;
use trc_config::CoreConfig;
use trc_provider::{ProviderFactory, ProviderSettings};
use trc_server::artifacts::ArtifactStore;
use trc_server::{build_app, AppState};
use trc_store::{ApiKeyIdentity, Store};

#[derive(Parser, Debug)]
#[command(name = "trc-server", version, about = "TRCODER control-plane server")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: String,

    /// Configuration root (model stack and policy files).
    #[arg(long, env = "TRCODER_CONFIG_ROOT")]
    config_root: Option<PathBuf>,

    /// Data directory for artifacts.
    #[arg(long, env = "TRCODER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// SQLite database path.
    #[arg(long, env = "TRCODER_DB_PATH")]
    db: Option<PathBuf>,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("trc=debug,trc_server=debug,tower_http=info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trc=info,trc_server=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let home_root = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".trcoder");
    let config_root = args.config_root.unwrap_or_else(|| home_root.join("config"));
    let data_dir = args.data_dir.unwrap_or_else(ArtifactStore::default_root);
    let db_path = args.db.unwrap_or_else(|| home_root.join("trcoder.db"));

    let (config, warnings) = CoreConfig::load(&config_root)
        .with_context(|| format!("load config from {}", config_root.display()))?;
    for warning in &warnings {
        warn!(%warning, "config warning");
    }

    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create data dir {}", parent.display()))?;
    }
    let store = Store::open(&db_path)
        .await
        .with_context(|| format!("open database {}", db_path.display()))?;

    // Bootstrap a local API key when one is supplied by the environment.
    if let Ok(token) = std::env::var("TRCODER_API_KEY") {
        store
            .create_api_key(
                &token,
                &ApiKeyIdentity {
                    org_id: "local".into(),
                    user_id: "local".into(),
                    billing_plan: "dev".into(),
                },
            )
            .await
            .context("bootstrap API key")?;
        info!("bootstrapped API key from TRCODER_API_KEY");
    }

    let factory = ProviderFactory::from_env(config.model_stack.clone(), ProviderSettings::default());
    let artifacts = ArtifactStore::new(&data_dir);

    let mut state =
        AppState::new(store, config, factory, artifacts).context("compile permission policy")?;
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        state = state.with_pr_adapter(Arc::new(GithubAdapter::new(token)));
    }
    let state = Arc::new(state);

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(
        bind = %args.bind,
        config = %config_root.display(),
        db = %db_path.display(),
        "trc-server listening"
    );

    axum::serve(listener, app).await.context("serve")
}
