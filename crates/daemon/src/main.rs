// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Marina daemon (marinad)
//!
//! Loads configuration, initializes the store and backends, resolves
//! the host staging path, wires the runner, and serves the HTTP API.

use marina_backend::{Backend, CustomImageBackend, ResticBackend};
use marina_config::BackendConfig;
use marina_core::InstanceId;
use marina_daemon::{api, AppState, AuthState};
use marina_engine::{build_schedules, Runner, RuntimeSnapshot, StagePaths};
use marina_federation::FederationClient;
use marina_runtime::{ContainerRuntime, DockerRuntime};
use marina_store::{JobLogger, Store};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info, warn};

const DEFAULT_CONFIG_FILE: &str = "/config.yml";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_STATIC_DIR: &str = "/app/web";
/// Mount destination of the staging bind inside this container.
const STAGE_MOUNT: &str = "/stage";
/// System logs older than this are pruned by the maintenance task.
const LOG_RETENTION_DAYS: i64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let config_file =
        std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let port: u16 = match std::env::var("API_PORT") {
        Ok(value) => value.parse()?,
        Err(_) => DEFAULT_PORT,
    };
    let static_dir =
        std::env::var("STATIC_DIR").unwrap_or_else(|_| DEFAULT_STATIC_DIR.to_string());

    let config = marina_config::load(&config_file)?;
    info!(
        instances = config.instances.len(),
        peers = config.peers.len(),
        "configuration loaded from {config_file}"
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&config.db_path).await?;
    let aborted = store.abort_stale_jobs().await?;
    if aborted > 0 {
        warn!(count = aborted, "aborted job rows left open by a previous run");
    }
    let logger = JobLogger::new(store.clone());

    let node_name = config.node_name.clone().unwrap_or_else(default_node_name);

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);

    let host_backup_path = match runtime.detect_own_mount(STAGE_MOUNT).await {
        Ok(path) => path,
        Err(e) if config.instances.is_empty() => {
            warn!(error = %e, "no staging mount; continuing without instances");
            PathBuf::from(STAGE_MOUNT)
        }
        Err(e) => {
            error!(error = %e, "cannot resolve the host staging path");
            return Err(e.into());
        }
    };
    let stage_paths = StagePaths::new(host_backup_path.clone(), STAGE_MOUNT);

    // one backend per instance; init failures skip the instance but do
    // not stop the node
    let mut backends = HashMap::new();
    let mut failed_instances: Vec<InstanceId> = Vec::new();
    for instance in &config.instances {
        let timeout = instance
            .backend_timeout
            .unwrap_or(config.default_backend_timeout);
        let env: Vec<(String, String)> = instance
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let backend = match &instance.backend {
            BackendConfig::Restic { repository } => {
                let mut env = env;
                env.push(("RESTIC_REPOSITORY".to_string(), repository.clone()));
                Backend::Restic(ResticBackend::new(env, timeout))
            }
            BackendConfig::CustomImage { image } => Backend::CustomImage(CustomImageBackend::new(
                image.clone(),
                instance.id.clone(),
                node_name.clone(),
                host_backup_path.clone(),
                env,
                timeout,
                Arc::clone(&runtime),
            )),
        };
        match backend.init().await {
            Ok(()) => {
                backends.insert(instance.id.clone(), backend);
            }
            Err(e) => {
                logger
                    .with_instance(&instance.id)
                    .error(format!("backend init failed: {e}"))
                    .await;
                failed_instances.push(instance.id.clone());
            }
        }
    }
    let mut active_config = config.clone();
    active_config
        .instances
        .retain(|i| !failed_instances.contains(&i.id));

    let snapshot = RuntimeSnapshot::collect(&runtime, &active_config).await;
    let (schedules, warnings) = build_schedules(&active_config, &snapshot);
    for warning in &warnings {
        logger.warn(warning.to_string()).await;
    }
    info!(count = schedules.len(), "schedule set built");

    let runner = Runner::new(
        store.clone(),
        logger.clone(),
        Arc::clone(&runtime),
        backends,
        stage_paths,
    );
    runner.sync(schedules).await?;

    spawn_log_pruning(store.clone());

    let federation = Arc::new(FederationClient::new(
        config.peers.clone(),
        config.auth_password.clone(),
    )?);
    let auth = Arc::new(AuthState::new(config.auth_password.clone()));
    let state = AppState {
        store,
        logger: logger.clone(),
        federation,
        auth,
        node_name: node_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let mut app = api::router(state);
    if !config.cors_origins.is_empty() {
        app = app.layer(cors_layer(&config.cors_origins));
    }
    if std::path::Path::new(&static_dir).is_dir() {
        let index = PathBuf::from(&static_dir).join("index.html");
        app = app.fallback_service(ServeDir::new(&static_dir).fallback(ServeFile::new(index)));
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(node = %node_name, port, "marina ready");
    logger.info(format!("node {node_name} started")).await;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    runner.shutdown().await;
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// Display name fallback: container hostname, then a fixed default.
fn default_node_name() -> String {
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }
    match std::fs::read_to_string("/etc/hostname") {
        Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
        _ => "marina".to_string(),
    }
}

fn cors_layer(origins: &[String]) -> tower_http::cors::CorsLayer {
    use axum::http::{header, HeaderValue, Method};
    use tower_http::cors::AllowOrigin;

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    tower_http::cors::CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Delete system logs past the retention window, daily.
fn spawn_log_pruning(store: Store) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(LOG_RETENTION_DAYS);
            match store.prune_logs(cutoff).await {
                Ok(0) => {}
                Ok(count) => info!(count, "pruned old log records"),
                Err(e) => warn!(error = %e, "log pruning failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    let sigint = async {
        match signal(SignalKind::interrupt()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot install SIGINT handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = sigterm => info!("received SIGTERM"),
        _ = sigint => info!("received SIGINT"),
    }
}
