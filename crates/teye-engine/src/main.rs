use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use teye_auth::{AdminSessionManager, CsrfGuard};
use teye_core::{CancellationRegistry, ConfigStore, PipelineBus, QuotaManager, SessionStore, Storage};
use teye_eyes::{EyeRegistry, RoutingEye};
use teye_observability::{init_process_logging, ProcessKind};
use teye_orchestrator::Overseer;
use teye_providers::{ProviderRegistry, ProvidersConfig};
use teye_server::{serve, AppState};

const DEFAULT_SESSION_TTL_MS: u64 = teye_core::DEFAULT_SESSION_TTL_MS;
const DEFAULT_ADMIN_SESSION_TTL_MS: u64 = 30 * 60 * 1_000;
const DEFAULT_CSRF_MAX_AGE_MS: u64 = 60 * 60 * 1_000;
const DEFAULT_TENANT_QUOTA: u32 = 120;

#[derive(Parser, Debug)]
#[command(name = "teye-engine")]
#[command(about = "Third Eye validation-orchestration service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP/WebSocket front-end.
    Serve {
        #[arg(long, alias = "host", default_value = "127.0.0.1")]
        hostname: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long)]
        state_dir: Option<String>,
    },
    /// Boot the full runtime off-line and report what's configured and
    /// reachable, without binding a port. Useful before a real deploy.
    Doctor {
        #[arg(long)]
        state_dir: Option<String>,
    },
    /// Re-save the on-disk config and storage files through the current
    /// schema, picking up new defaults for keys an older config predates.
    Migrate {
        #[arg(long)]
        state_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { hostname, port, state_dir } => {
            let state_dir = resolve_state_dir(state_dir);
            let _log_guard = bootstrap_logging(&state_dir)?;
            let state = build_state(&state_dir).await?;
            let addr: SocketAddr = format!("{hostname}:{port}")
                .parse()
                .context("invalid hostname or port")?;
            info!(%addr, state_dir = %state_dir.display(), "starting teye-engine");
            serve(addr, state).await?;
        }
        Command::Doctor { state_dir } => {
            let state_dir = resolve_state_dir(state_dir);
            let _log_guard = bootstrap_logging(&state_dir)?;
            let state = build_state(&state_dir).await?;
            run_doctor(&state).await;
        }
        Command::Migrate { state_dir } => {
            let state_dir = resolve_state_dir(state_dir);
            let _log_guard = bootstrap_logging(&state_dir)?;
            let state = build_state(&state_dir).await?;
            state.config.patch_runtime(serde_json::json!({})).await?;
            println!("config and storage re-saved at {}", state_dir.display());
        }
    }

    Ok(())
}

fn resolve_state_dir(flag: Option<String>) -> PathBuf {
    if let Some(dir) = flag {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("THIRD_EYE_STATE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    PathBuf::from(".third_eye")
}

fn bootstrap_logging(state_dir: &PathBuf) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = teye_observability::canonical_logs_dir_from_root(state_dir);
    let (guard, info) = init_process_logging(ProcessKind::Server, &logs_dir, 14)?;
    tracing::info!(logs_dir = %info.logs_dir, "structured logging initialized");
    Ok(guard)
}

async fn build_state(state_dir: &PathBuf) -> anyhow::Result<AppState> {
    let storage = Arc::new(Storage::new(state_dir.join("storage")).await?);
    let config = ConfigStore::new(
        state_dir.join("config.json"),
        state_dir.join("global.json"),
        None,
    )
    .await?;

    let providers_config: ProvidersConfig = config
        .get_path("providers")
        .await
        .map(serde_json::from_value)
        .transpose()?
        .unwrap_or_default();
    let providers = ProviderRegistry::new(providers_config);

    let sessions = SessionStore::new(storage.clone(), DEFAULT_SESSION_TTL_MS);
    let bus = PipelineBus::new();
    let cancellations = CancellationRegistry::new();

    let default_quota = config
        .get_path("quota.defaultLimit")
        .await
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .unwrap_or(DEFAULT_TENANT_QUOTA);
    let quotas = QuotaManager::new(default_quota);

    let eyes = EyeRegistry::new();
    let default_provider = providers.list().await.into_iter().next().map(|p| p.id);
    eyes.register(
        "routing",
        Arc::new(RoutingEye::new(
            providers.clone(),
            default_provider,
            Duration::from_secs(5),
            vec!["default_clarity".to_string(), "ambiguity_detector".to_string()],
        )),
    )
    .await;

    let overseer = Arc::new(Overseer::new(eyes.clone(), bus.clone()));

    let server_secret = resolve_server_secret(&config).await;
    let csrf = CsrfGuard::new(server_secret.clone(), DEFAULT_CSRF_MAX_AGE_MS);
    let admin_sessions = AdminSessionManager::new(csrf, DEFAULT_ADMIN_SESSION_TTL_MS);

    Ok(AppState {
        storage,
        config,
        sessions,
        quotas,
        bus,
        cancellations,
        providers,
        eyes,
        overseer,
        admin_sessions,
        pending_clarifications: teye_server::pending::PendingEnvelopes::new(),
        server_secret: Arc::new(server_secret),
    })
}

async fn resolve_server_secret(config: &ConfigStore) -> Vec<u8> {
    if let Ok(secret) = std::env::var("THIRD_EYE_SERVER_SECRET") {
        if !secret.trim().is_empty() {
            return secret.into_bytes();
        }
    }
    if let Some(configured) = config.get_path("server.secret").await.and_then(|v| v.as_str().map(str::to_string)) {
        if !configured.trim().is_empty() {
            return configured.into_bytes();
        }
    }
    tracing::warn!("no server secret configured; generating an ephemeral one for this process only");
    uuid::Uuid::new_v4().to_string().into_bytes()
}

async fn run_doctor(state: &AppState) {
    println!("Third Eye doctor report");
    println!("  storage:   ok");
    let providers = state.providers.list().await;
    if providers.is_empty() {
        println!("  providers: none configured (admin.passwordHash / providers.* not set)");
    } else {
        for provider in providers {
            let health = state.providers.health(&provider.id, teye_types::now_ms()).await;
            let status = match health {
                Ok(h) if h.healthy => "healthy",
                Ok(_) => "unhealthy",
                Err(_) => "unreachable",
            };
            println!("  provider:  {} ({}) - {status}", provider.id, provider.display_name);
        }
    }
    let eyes = state.eyes.list().await;
    println!("  eyes:      {} registered", eyes.len());
    for eye in eyes {
        println!("    - {} v{}", eye.name, eye.version);
    }
    match state.config.get_path("admin.email").await {
        Some(_) => println!("  admin:     configured"),
        None => println!("  admin:     not configured (admin login will fail)"),
    }
}
