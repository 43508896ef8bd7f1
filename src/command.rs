use redis::{Arg, RedisResult, Value};
use thiserror::Error;

/// Pseudo-command labelling the aggregate latency of a whole pipeline.
pub const PIPELINE: &str = "pipeline";

/// Terminal error state of an executed command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// "No data": the key was absent. An expected outcome, not a failure.
    #[error("redis: nil")]
    Nil,
    #[error("{0}")]
    Failed(String),
}

impl From<&redis::RedisError> for CommandError {
    fn from(err: &redis::RedisError) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Whether `err` should count towards error metrics.
pub fn is_actual_err(err: Option<&CommandError>) -> bool {
    matches!(err, Some(e) if *e != CommandError::Nil)
}

/// Descriptor of one executed command: its name and terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    name: String,
    err: Option<CommandError>,
}

impl Cmd {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            err: None,
        }
    }

    /// Describes a `redis` command; the name is its first argument, lowercased.
    pub fn from_redis(cmd: &redis::Cmd) -> Self {
        let name = match cmd.args_iter().next() {
            Some(Arg::Simple(bytes)) => String::from_utf8_lossy(bytes).to_lowercase(),
            _ => String::new(),
        };
        Self::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn err(&self) -> Option<&CommandError> {
        self.err.as_ref()
    }

    pub fn set_err(&mut self, err: CommandError) {
        self.err = Some(err);
    }

    /// Stores the outcome of executing this command. A nil reply becomes the
    /// [`CommandError::Nil`] sentinel.
    pub fn record(&mut self, result: &RedisResult<Value>) {
        match result {
            Ok(reply) => self.record_reply(reply),
            Err(e) => self.record_error(e),
        }
    }

    /// Pipelines carry per-command server errors inline as
    /// [`Value::ServerError`]; those are failures of this command alone.
    pub fn record_reply(&mut self, reply: &Value) {
        self.err = match reply {
            Value::Nil => Some(CommandError::Nil),
            Value::ServerError(err) => Some(CommandError::Failed(match err.details() {
                Some(details) => format!("{}: {details}", err.code()),
                None => err.code().to_owned(),
            })),
            _ => None,
        };
    }

    pub fn record_error(&mut self, err: &redis::RedisError) {
        self.err = Some(err.into());
    }
}
