#![forbid(unsafe_code)]

//! `form-pilot`: operator-supervised form automation server.
//!
//! Bootstraps configuration and storage, then serves the WebSocket observer
//! channel for dashboards and the IPC socket for `form-pilot-ctl`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use form_pilot::config::GlobalConfig;
use form_pilot::driver::EnvironmentProvider;
use form_pilot::ipc::{server as ipc_server, IPC_TOKEN_ENV};
use form_pilot::models::event::CancelReason;
use form_pilot::observer::{ws, ObserverHub};
use form_pilot::orchestrator::identity::IdentityGenerator;
use form_pilot::orchestrator::pause::PauseCoordinator;
use form_pilot::orchestrator::scheduler::CycleScheduler;
use form_pilot::orchestrator::session::{SessionRunner, SessionSettings};
use form_pilot::persistence::attempt_repo::AttemptRepo;
use form_pilot::persistence::counter_repo::IdentityCounterRepo;
use form_pilot::persistence::{db, retention};
use form_pilot::state::AppState;
use form_pilot::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "form-pilot", about = "Operator-supervised form automation server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the observer channel HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("form-pilot server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    let config = Arc::new(config);
    info!(steps = config.flow.steps.len(), "configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    info!(path = %config.db_path.display(), "database connected");

    // ── Start retention service ──────────────────────────
    let ct = CancellationToken::new();
    let retention_handle =
        retention::spawn_retention_task(Arc::clone(&db), config.retention_days, ct.clone());

    // ── Build the orchestrator ──────────────────────────
    let hub = ObserverHub::default();
    let pause = Arc::new(PauseCoordinator::new(hub.clone()));
    let identities = IdentityGenerator::new(
        IdentityCounterRepo::new(Arc::clone(&db)),
        config.identity.sequence_start,
        config.browser.viewports.clone(),
    );
    let runner = SessionRunner::new(
        environment_provider(&config),
        Arc::new(config.flow.clone()),
        identities,
        Arc::clone(&pause),
        hub.clone(),
        SessionSettings::from_config(&config),
    );
    let scheduler = Arc::new(
        CycleScheduler::new(runner, Arc::clone(&pause), hub.clone(), config.cooldown())
            .with_attempt_log(AttemptRepo::new(Arc::clone(&db))),
    );

    let ipc_auth_token = std::env::var(IPC_TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty());
    if ipc_auth_token.is_none() {
        warn!("{IPC_TOKEN_ENV} not set; IPC commands are accepted without authentication");
    }

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        db,
        hub,
        pause,
        scheduler,
        ipc_auth_token,
    });

    // ── Start transports ────────────────────────────────
    let ws_ct = ct.clone();
    let ws_state = Arc::clone(&state);
    let ws_handle = tokio::spawn(async move {
        if let Err(err) = ws::serve_observer(ws_state, ws_ct.clone()).await {
            error!(%err, "observer channel failed");
            ws_ct.cancel();
        }
    });

    let ipc_handle = ipc_server::spawn_ipc_server(Arc::clone(&state), ct.clone())?;

    info!(port = config.http_port, ipc_name = %config.ipc_name, "form-pilot ready");

    // ── Wait for shutdown signal ────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => warn!("transport failure; shutting down"),
    }

    state.scheduler.stop().await;
    state.pause.cancel_pending(CancelReason::Shutdown).await;
    let drain = config.step_timeout() * 2;
    if tokio::time::timeout(drain, state.scheduler.wait_idle())
        .await
        .is_err()
    {
        warn!(
            drain_secs = drain.as_secs(),
            "active run did not wind down in time"
        );
    }
    ct.cancel();

    // ── Wait for background tasks ───────────────────────
    let _ = tokio::join!(ws_handle, ipc_handle, retention_handle);
    info!("form-pilot shut down");

    Ok(())
}

#[cfg(feature = "browser")]
fn environment_provider(config: &GlobalConfig) -> Arc<dyn EnvironmentProvider> {
    Arc::new(form_pilot::driver::chromium::ChromiumProvider::new(
        config.browser.clone(),
    ))
}

#[cfg(not(feature = "browser"))]
fn environment_provider(_config: &GlobalConfig) -> Arc<dyn EnvironmentProvider> {
    warn!("built without the `browser` feature; attempts cannot acquire environments");
    Arc::new(form_pilot::driver::UnavailableProvider)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
