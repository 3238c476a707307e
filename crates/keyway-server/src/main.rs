//! Keyway backend binary.
//!
//! Serves the access API over HTTP. State lives in a redb file when `--db`
//! is given and in memory otherwise. Workspaces start from the admins
//! named by `--bootstrap-admin`; everything else is managed over the API.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use keyway_core::SystemEnv;
use keyway_crypto::MasterKey;
use keyway_server::{
    AccessService, BootstrapAdmin, BuilderConfig, MemoryStorage, ProviderConfig, ProviderContext,
    RedbStorage, Storage, build_router, identity::FileKeySetSource,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Keyway access backend
#[derive(Parser, Debug)]
#[command(name = "keyway-server")]
#[command(about = "Keyway lock access backend", long_about = None)]
struct Cli {
    /// Address to bind to
    #[arg(long, env = "KEYWAY_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// redb database file; in-memory when omitted
    #[arg(long, env = "KEYWAY_DB")]
    db: Option<PathBuf>,

    /// Base64 32-byte master key sealing lock admin keys
    #[arg(long, env = "KEYWAY_MASTER_KEY", hide_env_values = true)]
    master_key: String,

    /// Identity provider key set (JWKS file)
    #[arg(long, env = "KEYWAY_JWKS")]
    jwks: PathBuf,

    /// Required token issuer
    #[arg(long, env = "KEYWAY_ISSUER")]
    issuer: Option<String>,

    /// Seconds a loaded key set is trusted
    #[arg(long, default_value_t = 300)]
    jwks_ttl_secs: u64,

    /// Workspace admins to seed, as `workspace:user`
    #[arg(long = "bootstrap-admin", env = "KEYWAY_BOOTSTRAP_ADMIN", value_delimiter = ',')]
    bootstrap_admins: Vec<BootstrapAdmin>,

    /// Version attempts per ACL rebuild
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let master = MasterKey::from_base64(&cli.master_key)?;

    let storage: Arc<dyn Storage> = match &cli.db {
        Some(path) => {
            info!(path = %path.display(), "opening database");
            Arc::new(RedbStorage::open(path)?)
        },
        None => {
            info!("no database configured, state is in memory");
            Arc::new(MemoryStorage::new())
        },
    };

    let service = Arc::new(AccessService::new(
        storage,
        SystemEnv,
        master,
        BuilderConfig { max_attempts: cli.max_attempts },
    ));
    for admin in &cli.bootstrap_admins {
        service.bootstrap_admin(admin)?;
    }

    let provider = ProviderContext::new(
        FileKeySetSource::new(&cli.jwks),
        SystemEnv,
        ProviderConfig {
            key_set_ttl: Duration::from_secs(cli.jwks_ttl_secs),
            issuer: cli.issuer.clone(),
            ..ProviderConfig::default()
        },
    );

    let app = build_router(service, Arc::new(provider));
    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    info!(addr = %cli.bind, "keyway-server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
