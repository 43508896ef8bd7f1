use serde::Deserialize;

/// Latency boundaries in seconds: 100 μs → 5 s.
pub const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
    2.5, 5.0,
];

/// Settings shared by the four metric sinks of a [`MetricsHook`].
///
/// ```
/// use redis_metrics_hook::Options;
///
/// let opts = Options::default().instance_name("sessions").namespace("app");
/// assert_eq!(opts.instance_name, "sessions");
/// ```
///
/// [`MetricsHook`]: crate::MetricsHook
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Options {
    /// Value of the `instance` label, identifies the connection or pool.
    pub instance_name: String,
    /// Prefix for every metric name.
    pub namespace: String,
    /// Histogram boundaries for single-command latency, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            instance_name: String::new(),
            namespace: String::new(),
            duration_buckets: DEFAULT_DURATION_BUCKETS.to_vec(),
        }
    }
}

impl Options {
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn duration_buckets(mut self, buckets: impl Into<Vec<f64>>) -> Self {
        self.duration_buckets = buckets.into();
        self
    }
}
