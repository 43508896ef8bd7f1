use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use redis_metrics_hook::InstrumentedConnection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

type Conn = InstrumentedConnection<ConnectionManager>;

/// Shape of the generated traffic.
#[derive(Debug, Clone, Copy)]
pub struct LoadConfig {
    pub concurrency: u32,
    pub duration_secs: u64,
    pub read_pct: u8,
    pub pipeline_pct: u8,
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that hammer Redis through the
/// instrumented connection until the deadline or until `running` is
/// cleared. Latency and errors are recorded by the hook, not here.
pub async fn run(running: Arc<AtomicBool>, redis: Conn, config: LoadConfig) {
    let deadline = Instant::now() + Duration::from_secs(config.duration_secs);

    let handles: Vec<_> = (0..config.concurrency)
        .map(|worker_id| {
            let running = running.clone();
            let conn = redis.clone();
            tokio::spawn(worker(worker_id, running, conn, deadline, config))
        })
        .collect();

    for h in handles {
        let _ = h.await;
    }

    running.store(false, Ordering::SeqCst);
    info!("load generator finished");
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    mut conn: Conn,
    deadline: Instant,
    config: LoadConfig,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let result = if rng.gen_range(0u8..100) < config.pipeline_pct {
            do_pipeline(&mut rng, &mut conn).await
        } else if rng.gen_range(0u8..100) < config.read_pct {
            do_read(&mut rng, &mut conn).await
        } else {
            do_write(&mut rng, &mut conn).await
        };

        if let Err(e) = result {
            debug!(worker = id, error = %e, "redis operation failed");
        }
    }
}

// ─── Operations ──────────────────────────────────────────────────

/// One in five reads targets a user that was never seeded, so the hook
/// sees nil replies alongside hits.
async fn do_read(rng: &mut StdRng, conn: &mut Conn) -> RedisResult<()> {
    let id = rng.gen_range(1..=crate::mock_data::NUM_USERS * 5 / 4);
    let _: Option<String> = conn.hget(format!("user:usr_{id:08}"), "name").await?;
    Ok(())
}

async fn do_write(rng: &mut StdRng, conn: &mut Conn) -> RedisResult<()> {
    let key = format!("session:sess_{:08x}", rng.gen::<u32>());
    let token = format!("tok_{:016x}", rng.gen::<u64>());
    conn.set_ex(key, token, 300).await
}

/// Bumps a few product view counters and reads one back in one round trip.
async fn do_pipeline(rng: &mut StdRng, conn: &mut Conn) -> RedisResult<()> {
    let mut pipe = redis::pipe();
    for _ in 0..rng.gen_range(2..=5) {
        let id = rng.gen_range(1..=crate::mock_data::NUM_PRODUCTS);
        pipe.cmd("INCR").arg(format!("views:prod_{id:04}")).ignore();
    }
    pipe.cmd("GET").arg("views:prod_0001");

    let _: (Option<u64>,) = pipe.query_async(conn).await?;
    Ok(())
}
