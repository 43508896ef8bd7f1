//! Prometheus instrumentation for Redis commands.
//!
//! [`MetricsHook`] times every single command, counts every pipelined
//! command, and counts real failures of both (an absent key is not a
//! failure). Wrap a connection with [`InstrumentedConnection`] and the rest
//! of the application keeps using the `redis` API as before:
//!
//! ```no_run
//! use redis::AsyncCommands;
//! use redis_metrics_hook::{Hooks, MetricsHook, Options};
//!
//! # async fn run() -> redis_metrics_hook::Result<()> {
//! let hooks = Hooks::builder()
//!     .hook(MetricsHook::new(Options::default().instance_name("sessions")))
//!     .build();
//! let mut conn = redis_metrics_hook::connect("redis://127.0.0.1:6379/", hooks).await?;
//! let _: Option<String> = conn.get("session:abc").await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod error;
pub mod hook;
pub mod metrics;
pub mod options;
pub mod redis_client;

pub use command::{is_actual_err, Cmd, CommandError, PIPELINE};
pub use error::{Error, Result};
pub use hook::{Hook, Hooks, HooksBuilder, Invocation, Pending};
pub use metrics::{ConflictPolicy, MetricsHook, MetricsRegistry, Registration};
pub use options::Options;
pub use redis_client::{connect, InstrumentedConnection};
