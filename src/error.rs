use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced while wiring the instrumentation up.
///
/// Command failures never show up here: those belong to the caller and are
/// returned by the wrapped connection exactly as the server produced them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// A collector with the same name is already registered and the
    /// conflict policy asked us not to reuse it.
    #[error("metric `{name}` is already registered")]
    AlreadyRegistered { name: String },

    /// The name is taken by a collector we cannot hand back: either a
    /// different metric type, or one registered on the raw registry.
    #[error("metric `{name}` is registered with an incompatible collector")]
    Conflict { name: String },

    #[error("collector exposes no metric descriptor")]
    NoDescriptor,

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}
