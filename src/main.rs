use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis_metrics_hook::{Hooks, InstrumentedConnection, MetricsHook, MetricsRegistry, Options};
use tracing::{error, info};

mod handlers;
mod load_generator;
mod mock_data;
mod server;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Instrumented, cloneable Redis connection (auto-reconnects).
    pub redis: InstrumentedConnection<ConnectionManager>,

    /// Registry the exporter endpoints read from.
    pub registry: &'static MetricsRegistry,

    /// Flag checked by every load-generator worker on each iteration.
    pub load_running: Arc<AtomicBool>,

    /// Handle to the spawned load-generator task so we can await clean shutdown.
    pub load_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  REDIS COMMAND METRICS OBSERVATORY          ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".into());
    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    // ── 1. Register metrics & connect ────────────────────────────
    let metrics = MetricsHook::new(
        Options::default()
            .instance_name("observatory")
            .namespace(std::env::var("METRICS_NAMESPACE").unwrap_or_default()),
    );
    let hooks = Hooks::builder().hook(metrics).build();

    info!(url = %redis_url, "connecting to redis");
    let redis = redis_metrics_hook::connect(&redis_url, hooks)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "cannot connect to redis, is redis-server running?");
            std::process::exit(1);
        });

    // ── 2. Seed mock data (pipelined, so it shows up in metrics) ─
    if let Err(e) = mock_data::seed(&redis).await {
        error!(error = %e, "seeding failed");
        std::process::exit(1);
    }

    // ── 3. Build shared state & router ───────────────────────────
    let state = Arc::new(AppState {
        redis,
        registry: MetricsRegistry::global(),
        load_running: Arc::new(AtomicBool::new(false)),
        load_handle: tokio::sync::Mutex::new(None),
    });
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind, is the port already in use?");
            std::process::exit(1);
        }
    };

    info!(%addr, "metrics      → GET  /metrics");
    info!(%addr, "summary      → GET  /api/metrics");
    info!(%addr, "load control → POST /api/benchmark/start | stop");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server exited with error");
    }
}
