use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::load_generator::LoadConfig;
use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of concurrent Tokio tasks generating load
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// How long the load runs (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Percentage of operations that are reads (0–100)
    #[serde(default = "default_read_pct")]
    pub read_pct: u8,

    /// Percentage of operations sent as a pipeline (0–100)
    #[serde(default = "default_pipeline_pct")]
    pub pipeline_pct: u8,
}

fn default_concurrency() -> u32 {
    10
}
fn default_duration() -> u64 {
    30
}
fn default_read_pct() -> u8 {
    70
}
fn default_pipeline_pct() -> u8 {
    10
}

#[derive(Debug, Serialize)]
pub struct BenchmarkStatus {
    pub running: bool,
    pub message: String,
}

impl BenchmarkConfig {
    fn validate(&self) -> Result<LoadConfig, AppError> {
        if self.concurrency == 0 || self.concurrency > 500 {
            return Err(AppError::BadRequest(
                "concurrency must be between 1 and 500".into(),
            ));
        }
        if self.duration_secs == 0 || self.duration_secs > 300 {
            return Err(AppError::BadRequest(
                "duration_secs must be between 1 and 300".into(),
            ));
        }
        if self.read_pct > 100 || self.pipeline_pct > 100 {
            return Err(AppError::BadRequest(
                "read_pct and pipeline_pct must be between 0 and 100".into(),
            ));
        }
        Ok(LoadConfig {
            concurrency: self.concurrency,
            duration_secs: self.duration_secs,
            read_pct: self.read_pct,
            pipeline_pct: self.pipeline_pct,
        })
    }
}

// ─── POST /api/benchmark/start ───────────────────────────────────

pub async fn start_benchmark(
    State(state): State<Arc<AppState>>,
    Json(config): Json<BenchmarkConfig>,
) -> Result<Json<BenchmarkStatus>, AppError> {
    // Guard: only one load generator at a time
    if state.load_running.load(Ordering::SeqCst) {
        return Err(AppError::AlreadyRunning);
    }
    let load = config.validate()?;

    // Flip the flag BEFORE spawning so workers see it immediately
    state.load_running.store(true, Ordering::SeqCst);

    let msg = format!(
        "Started: {} workers × {}s, {}% reads, {}% pipelined",
        load.concurrency, load.duration_secs, load.read_pct, load.pipeline_pct,
    );

    let running = state.load_running.clone();
    let redis = state.redis.clone();
    let handle = tokio::spawn(async move {
        crate::load_generator::run(running, redis, load).await;
    });

    // Stash the handle so `stop` can await clean shutdown
    *state.load_handle.lock().await = Some(handle);

    Ok(Json(BenchmarkStatus {
        running: true,
        message: msg,
    }))
}

// ─── POST /api/benchmark/stop ────────────────────────────────────

pub async fn stop_benchmark(
    State(state): State<Arc<AppState>>,
) -> Json<BenchmarkStatus> {
    if !state.load_running.load(Ordering::SeqCst) {
        return Json(BenchmarkStatus {
            running: false,
            message: "No load generator is running".into(),
        });
    }

    state.load_running.store(false, Ordering::SeqCst);

    if let Some(handle) = state.load_handle.lock().await.take() {
        // Ignore JoinError — the task may have already finished
        let _ = handle.await;
    }

    Json(BenchmarkStatus {
        running: false,
        message: "Load generator stopped".into(),
    })
}

// ─── GET /api/benchmark/status ───────────────────────────────────

pub async fn benchmark_status(
    State(state): State<Arc<AppState>>,
) -> Json<BenchmarkStatus> {
    let running = state.load_running.load(Ordering::SeqCst);
    Json(BenchmarkStatus {
        running,
        message: if running {
            "Load generator in progress".into()
        } else {
            "Idle".into()
        },
    })
}
