//! Extension points around command execution.
//!
//! A [`Hook`] observes three moments of a connection's life: dialing, single
//! commands and pipelines. Hooks never drive execution. Each "before" phase
//! hands back an [`Invocation`] and the caller threads it into the matching
//! "after" phase, so concurrent calls never share timing state.
//!
//! [`Hooks`] is the fixed chain the execution engine talks to: before phases
//! run in registration order, after phases in reverse.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::command::Cmd;

/// Per-call state created by a before phase and consumed by its after phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    started_at: Option<Instant>,
}

impl Invocation {
    /// Starts the clock.
    pub fn begin() -> Self {
        Self {
            started_at: Some(Instant::now()),
        }
    }

    /// An invocation carrying no timestamp; after phases skip latency.
    pub fn untimed() -> Self {
        Self { started_at: None }
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }
}

pub trait Hook: Send + Sync {
    /// Called before a connection is established. Passthrough unless overridden.
    fn dial(&self, _addr: &str) {}

    fn before_process(&self, _cmd: &Cmd) -> Invocation {
        Invocation::begin()
    }

    /// Sees the command after execution. Cannot fail the command.
    fn after_process(&self, _invocation: Invocation, _cmd: &Cmd) {}

    fn before_process_pipeline(&self, _cmds: &[Cmd]) -> Invocation {
        Invocation::begin()
    }

    fn after_process_pipeline(&self, _invocation: Invocation, _cmds: &[Cmd]) {}
}

/// Invocations of every hook in a chain, in chain order.
#[must_use = "pass the pending invocations to the matching after phase"]
#[derive(Debug)]
pub struct Pending {
    invocations: Vec<Invocation>,
}

/// Ordered, immutable chain of hooks.
#[derive(Clone, Default)]
pub struct Hooks {
    chain: Vec<Arc<dyn Hook>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("len", &self.chain.len())
            .finish()
    }
}

#[derive(Default)]
pub struct HooksBuilder {
    chain: Vec<Arc<dyn Hook>>,
}

impl HooksBuilder {
    pub fn hook(mut self, hook: impl Hook + 'static) -> Self {
        self.chain.push(Arc::new(hook));
        self
    }

    pub fn shared(mut self, hook: Arc<dyn Hook>) -> Self {
        self.chain.push(hook);
        self
    }

    pub fn build(self) -> Hooks {
        Hooks { chain: self.chain }
    }
}

impl Hooks {
    pub fn builder() -> HooksBuilder {
        HooksBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    // ─── Explicit phases ─────────────────────────────────────────

    pub fn before_process(&self, cmd: &Cmd) -> Pending {
        Pending {
            invocations: self.chain.iter().map(|h| h.before_process(cmd)).collect(),
        }
    }

    pub fn after_process(&self, pending: Pending, cmd: &Cmd) {
        for (hook, invocation) in self.chain.iter().zip(pending.invocations).rev() {
            hook.after_process(invocation, cmd);
        }
    }

    pub fn before_process_pipeline(&self, cmds: &[Cmd]) -> Pending {
        Pending {
            invocations: self
                .chain
                .iter()
                .map(|h| h.before_process_pipeline(cmds))
                .collect(),
        }
    }

    pub fn after_process_pipeline(&self, pending: Pending, cmds: &[Cmd]) {
        for (hook, invocation) in self.chain.iter().zip(pending.invocations).rev() {
            hook.after_process_pipeline(invocation, cmds);
        }
    }

    // ─── Wrapped stages ──────────────────────────────────────────

    /// Runs `next` inside the dial extension point.
    pub async fn dial<F, T, E>(&self, addr: &str, next: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        for hook in &self.chain {
            hook.dial(addr);
        }
        next.await
    }

    /// Brackets `next` with the before/after phases of every hook.
    ///
    /// `next` executes the command and records its terminal state on the
    /// descriptor. When `next` itself fails, no after phase runs and the
    /// error is returned untouched.
    pub async fn process<F, Fut, T, E>(&self, cmd: Cmd, next: F) -> Result<(Cmd, T), E>
    where
        F: FnOnce(Cmd) -> Fut,
        Fut: Future<Output = Result<(Cmd, T), E>>,
    {
        let pending = self.before_process(&cmd);
        let (cmd, out) = next(cmd).await?;
        self.after_process(pending, &cmd);
        Ok((cmd, out))
    }

    /// Pipeline counterpart of [`Hooks::process`].
    pub async fn process_pipeline<F, Fut, T, E>(
        &self,
        cmds: Vec<Cmd>,
        next: F,
    ) -> Result<(Vec<Cmd>, T), E>
    where
        F: FnOnce(Vec<Cmd>) -> Fut,
        Fut: Future<Output = Result<(Vec<Cmd>, T), E>>,
    {
        let pending = self.before_process_pipeline(&cmds);
        let (cmds, out) = next(cmds).await?;
        self.after_process_pipeline(pending, &cmds);
        Ok((cmds, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Writes every phase it sees into a shared journal.
    struct Journal {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Hook for Journal {
        fn dial(&self, addr: &str) {
            self.log.lock().push(format!("{} dial {addr}", self.tag));
        }

        fn before_process(&self, cmd: &Cmd) -> Invocation {
            self.log.lock().push(format!("{} before {}", self.tag, cmd.name()));
            Invocation::begin()
        }

        fn after_process(&self, invocation: Invocation, cmd: &Cmd) {
            assert!(invocation.started_at().is_some());
            self.log.lock().push(format!("{} after {}", self.tag, cmd.name()));
        }

        fn before_process_pipeline(&self, cmds: &[Cmd]) -> Invocation {
            self.log.lock().push(format!("{} before pipe {}", self.tag, cmds.len()));
            Invocation::begin()
        }

        fn after_process_pipeline(&self, _invocation: Invocation, cmds: &[Cmd]) {
            self.log.lock().push(format!("{} after pipe {}", self.tag, cmds.len()));
        }
    }

    fn chain(log: &Arc<Mutex<Vec<String>>>) -> Hooks {
        Hooks::builder()
            .hook(Journal { tag: "outer", log: log.clone() })
            .hook(Journal { tag: "inner", log: log.clone() })
            .build()
    }

    #[tokio::test]
    async fn after_phases_unwind_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = chain(&log);

        let (cmd, reply) = hooks
            .process(Cmd::new("get"), |cmd| async move {
                Ok::<_, ()>((cmd, "value"))
            })
            .await
            .unwrap();

        assert_eq!(cmd.name(), "get");
        assert_eq!(reply, "value");
        assert_eq!(
            *log.lock(),
            vec!["outer before get", "inner before get", "inner after get", "outer after get"]
        );
    }

    #[tokio::test]
    async fn failed_execution_skips_after_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = chain(&log);

        let err = hooks
            .process(Cmd::new("set"), |_cmd| async { Err::<(Cmd, ()), _>("dial failed") })
            .await
            .unwrap_err();

        assert_eq!(err, "dial failed");
        assert_eq!(*log.lock(), vec!["outer before set", "inner before set"]);
    }

    #[tokio::test]
    async fn pipeline_phases_see_whole_batch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = chain(&log);

        let batch = vec![Cmd::new("get"), Cmd::new("set")];
        hooks
            .process_pipeline(batch, |cmds| async move { Ok::<_, ()>((cmds, ())) })
            .await
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "outer before pipe 2",
                "inner before pipe 2",
                "inner after pipe 2",
                "outer after pipe 2"
            ]
        );
    }

    #[tokio::test]
    async fn dial_is_a_passthrough() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = chain(&log);

        let conn = hooks
            .dial("127.0.0.1:6379", async { Ok::<_, ()>(42) })
            .await
            .unwrap();

        assert_eq!(conn, 42);
        assert_eq!(
            *log.lock(),
            vec!["outer dial 127.0.0.1:6379", "inner dial 127.0.0.1:6379"]
        );
    }

    #[test]
    fn untimed_invocation_has_no_elapsed() {
        assert_eq!(Invocation::untimed().elapsed(), None);
        assert!(Invocation::begin().elapsed().is_some());
    }
}
