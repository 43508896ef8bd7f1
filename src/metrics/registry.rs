use std::any::Any;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::debug;

use crate::error::{Error, Result};

static GLOBAL: Lazy<MetricsRegistry> =
    Lazy::new(|| MetricsRegistry::with_registry(prometheus::default_registry().clone()));

/// What to do when a collector with the same name was registered before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Hand back the collector that is already registered.
    #[default]
    Reuse,
    /// Fail with [`Error::AlreadyRegistered`].
    Reject,
}

/// Outcome of [`MetricsRegistry::register`].
#[derive(Debug, Clone)]
pub enum Registration<C> {
    Registered(C),
    /// The name was taken; carries the existing collector.
    AlreadyRegistered(C),
}

impl<C> Registration<C> {
    pub fn into_inner(self) -> C {
        match self {
            Self::Registered(c) | Self::AlreadyRegistered(c) => c,
        }
    }
}

/// A Prometheus registry that remembers the collectors registered through
/// it, so a second registration under the same name can return the first
/// collector instead of an error.
pub struct MetricsRegistry {
    registry: Registry,
    // fq name → collector handle
    registered: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl MetricsRegistry {
    /// A fresh, isolated registry.
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            registered: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide registry backed by `prometheus::default_registry()`.
    pub fn global() -> &'static MetricsRegistry {
        &GLOBAL
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers `collector` under the fully-qualified name of its first
    /// descriptor.
    pub fn register<C>(&self, collector: C) -> Result<Registration<C>>
    where
        C: Collector + Clone + 'static,
    {
        let name = fq_name(&collector)?;

        // Held across the inner registration so racing callers agree on
        // which collector won.
        let mut registered = self.registered.lock();
        if let Some(existing) = registered.get(&name) {
            return existing
                .downcast_ref::<C>()
                .cloned()
                .map(Registration::AlreadyRegistered)
                .ok_or(Error::Conflict { name });
        }

        match self.registry.register(Box::new(collector.clone())) {
            Ok(()) => {
                registered.insert(name, Box::new(collector.clone()));
                Ok(Registration::Registered(collector))
            }
            Err(prometheus::Error::AlreadyReg) => Err(Error::Conflict { name }),
            Err(e) => Err(e.into()),
        }
    }

    /// Registers `collector`, resolving a name conflict with `policy`.
    pub fn register_with<C>(&self, collector: C, policy: ConflictPolicy) -> Result<C>
    where
        C: Collector + Clone + 'static,
    {
        let existing = match self.register(collector)? {
            Registration::Registered(c) => return Ok(c),
            Registration::AlreadyRegistered(c) => c,
        };

        let name = fq_name(&existing)?;
        match policy {
            ConflictPolicy::Reuse => {
                debug!(metric = %name, "reusing registered collector");
                Ok(existing)
            }
            ConflictPolicy::Reject => Err(Error::AlreadyRegistered { name }),
        }
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Renders every metric in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn fq_name<C: Collector>(collector: &C) -> Result<String> {
    collector
        .desc()
        .first()
        .map(|d| d.fq_name.clone())
        .ok_or(Error::NoDescriptor)
}
