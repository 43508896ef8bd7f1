pub mod hook;
pub mod registry;

pub use hook::MetricsHook;
pub use registry::{ConflictPolicy, MetricsRegistry, Registration};
