use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use redis_metrics_hook::InstrumentedConnection;
use std::time::Instant;
use tracing::info;

// ─── Constants ───────────────────────────────────────────────────

pub const NUM_USERS: usize = 10_000;
pub const NUM_PRODUCTS: usize = 500;
/// Pipeline batch size — keeps Redis buffers comfortable.
const BATCH: usize = 500;

// ─── Name pools ──────────────────────────────────────────────────

static FIRST: &[&str] = &[
    "Emma", "Liam", "Olivia", "Noah", "Ava", "Ethan", "Sophia", "Mason",
];

static LAST: &[&str] = &[
    "Smith", "Johnson", "Garcia", "Miller", "Davis", "Lopez", "Wilson", "Lee",
];

static ROLES: &[&str] = &["admin", "editor", "viewer"];

// ─── Public entry point ──────────────────────────────────────────

/// Seeds users and product view counters in pipelined batches. The batches
/// go through the instrumented connection, so seeding shows up as
/// `hset`/`set` pipelined commands and `pipeline` latency.
pub async fn seed(conn: &InstrumentedConnection<ConnectionManager>) -> RedisResult<()> {
    let start = Instant::now();
    info!(users = NUM_USERS, products = NUM_PRODUCTS, "seeding redis");

    let mut conn = conn.clone();
    // Deterministic RNG so re-runs produce the same data.
    let mut rng = StdRng::seed_from_u64(42);

    for batch_start in (0..NUM_USERS).step_by(BATCH) {
        let batch_end = (batch_start + BATCH).min(NUM_USERS);
        let mut pipe = redis::pipe();

        for i in batch_start..batch_end {
            let id = format!("usr_{:08}", i + 1);
            let first = FIRST[rng.gen_range(0..FIRST.len())];
            let last = LAST[rng.gen_range(0..LAST.len())];

            pipe.cmd("HSET")
                .arg(format!("user:{id}"))
                .arg("id")
                .arg(&id)
                .arg("name")
                .arg(format!("{first} {last}"))
                .arg("role")
                .arg(ROLES[rng.gen_range(0..ROLES.len())])
                .ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
    }

    let mut pipe = redis::pipe();
    for i in 0..NUM_PRODUCTS {
        pipe.cmd("SET")
            .arg(format!("views:prod_{:04}", i + 1))
            .arg(0u64)
            .ignore();
    }
    let _: () = pipe.query_async(&mut conn).await?;

    info!(elapsed_secs = start.elapsed().as_secs_f64(), "seed complete");
    Ok(())
}
