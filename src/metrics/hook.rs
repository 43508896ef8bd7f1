use prometheus::{CounterVec, Histogram, HistogramOpts, HistogramVec, Opts};
use tracing::trace;

use super::registry::{ConflictPolicy, MetricsRegistry};
use crate::command::{is_actual_err, Cmd, PIPELINE};
use crate::error::Result;
use crate::hook::{Hook, Invocation};
use crate::options::Options;

const LABEL_NAMES: &[&str] = &["instance", "command"];

/// Hook exporting Prometheus metrics for commands and pipelines.
///
/// Single commands get a latency histogram and an error counter. Pipelined
/// commands get a command counter and an error counter; their individual
/// latency is not observable, so the pipeline as a whole is timed under the
/// pseudo-command `"pipeline"` in the single-command histogram.
#[derive(Clone)]
pub struct MetricsHook {
    options: Options,
    single_commands: HistogramVec,
    pipelined_commands: CounterVec,
    single_errors: CounterVec,
    pipelined_errors: CounterVec,
}

impl MetricsHook {
    /// Registers the sinks in the process-wide registry, reusing them when
    /// another hook already did.
    ///
    /// # Panics
    ///
    /// On any registration failure other than a reusable duplicate.
    pub fn new(options: Options) -> Self {
        Self::register(MetricsRegistry::global(), options, ConflictPolicy::Reuse)
            .unwrap_or_else(|e| panic!("registering redis metrics: {e}"))
    }

    pub fn register(
        registry: &MetricsRegistry,
        options: Options,
        policy: ConflictPolicy,
    ) -> Result<Self> {
        let ns = options.namespace.as_str();

        let latency_opts =
            HistogramOpts::new("redis_single_commands", "Histogram of single Redis commands")
                .namespace(ns)
                .buckets(options.duration_buckets.clone());
        // The vec only checks buckets when its first child is created.
        Histogram::with_opts(latency_opts.clone())?;

        let single_commands = registry
            .register_with(HistogramVec::new(latency_opts, LABEL_NAMES)?, policy)?;

        let pipelined_commands = registry.register_with(
            CounterVec::new(
                Opts::new("redis_pipelined_commands", "Number of pipelined Redis commands")
                    .namespace(ns),
                LABEL_NAMES,
            )?,
            policy,
        )?;

        let single_errors = registry.register_with(
            CounterVec::new(
                Opts::new(
                    "redis_single_errors",
                    "Number of single Redis commands that have failed",
                )
                .namespace(ns),
                LABEL_NAMES,
            )?,
            policy,
        )?;

        let pipelined_errors = registry.register_with(
            CounterVec::new(
                Opts::new(
                    "redis_pipelined_errors",
                    "Number of pipelined Redis commands that have failed",
                )
                .namespace(ns),
                LABEL_NAMES,
            )?,
            policy,
        )?;

        Ok(Self {
            options,
            single_commands,
            pipelined_commands,
            single_errors,
            pipelined_errors,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn single_commands(&self) -> &HistogramVec {
        &self.single_commands
    }

    pub fn pipelined_commands(&self) -> &CounterVec {
        &self.pipelined_commands
    }

    pub fn single_errors(&self) -> &CounterVec {
        &self.single_errors
    }

    pub fn pipelined_errors(&self) -> &CounterVec {
        &self.pipelined_errors
    }

    fn labels<'a>(&'a self, cmd: &'a Cmd) -> [&'a str; 2] {
        [self.options.instance_name.as_str(), cmd.name()]
    }
}

impl Hook for MetricsHook {
    fn before_process(&self, _cmd: &Cmd) -> Invocation {
        Invocation::begin()
    }

    fn after_process(&self, invocation: Invocation, cmd: &Cmd) {
        let labels = self.labels(cmd);

        match invocation.elapsed() {
            Some(elapsed) => self
                .single_commands
                .with_label_values(&labels)
                .observe(elapsed.as_secs_f64()),
            None => trace!(command = cmd.name(), "no start time, latency not recorded"),
        }

        if is_actual_err(cmd.err()) {
            self.single_errors.with_label_values(&labels).inc();
        }
    }

    fn before_process_pipeline(&self, _cmds: &[Cmd]) -> Invocation {
        Invocation::begin()
    }

    fn after_process_pipeline(&self, invocation: Invocation, cmds: &[Cmd]) {
        self.after_process(invocation, &Cmd::new(PIPELINE));

        for cmd in cmds {
            let labels = self.labels(cmd);
            self.pipelined_commands.with_label_values(&labels).inc();

            if is_actual_err(cmd.err()) {
                self.pipelined_errors.with_label_values(&labels).inc();
            }
        }
    }
}
