use redis::aio::{ConnectionLike, ConnectionManager};
use redis::{RedisError, RedisFuture, RedisResult, Value};
use tracing::warn;

use crate::command::{Cmd, CommandError};
use crate::error::Result;
use crate::hook::Hooks;

/// Opens a `ConnectionManager` (auto-reconnecting, cheaply cloneable) behind
/// the dial extension point and wraps it with `hooks`.
pub async fn connect(url: &str, hooks: Hooks) -> Result<InstrumentedConnection<ConnectionManager>> {
    let client = redis::Client::open(url)?;
    let addr = client.get_connection_info().addr.to_string();

    let manager = hooks.dial(&addr, ConnectionManager::new(client)).await?;
    Ok(InstrumentedConnection::new(manager, hooks))
}

/// An async connection that runs every command and pipeline through a
/// [`Hooks`] chain.
///
/// It is itself a [`ConnectionLike`], so `AsyncCommands`, `Cmd::query_async`
/// and `Pipeline::query_async` work unchanged on top of it. Results reach the
/// caller exactly as the inner connection produced them.
#[derive(Clone)]
pub struct InstrumentedConnection<C> {
    inner: C,
    hooks: Hooks,
}

impl<C> InstrumentedConnection<C> {
    pub fn new(inner: C, hooks: Hooks) -> Self {
        Self { inner, hooks }
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C> ConnectionLike for InstrumentedConnection<C>
where
    C: ConnectionLike + Send,
{
    fn req_packed_command<'a>(&'a mut self, cmd: &'a redis::Cmd) -> RedisFuture<'a, Value> {
        Box::pin(async move {
            let mut descriptor = Cmd::from_redis(cmd);
            let pending = self.hooks.before_process(&descriptor);

            let result = self.inner.req_packed_command(cmd).await;

            descriptor.record(&result);
            self.hooks.after_process(pending, &descriptor);
            result
        })
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        pipeline: &'a redis::Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        Box::pin(async move {
            let mut descriptors: Vec<Cmd> = pipeline.cmd_iter().map(Cmd::from_redis).collect();
            let pending = self.hooks.before_process_pipeline(&descriptors);

            let result = self.inner.req_packed_commands(pipeline, offset, count).await;

            record_replies(&mut descriptors, offset, &result);
            self.hooks.after_process_pipeline(pending, &descriptors);
            result
        })
    }

    fn get_db(&self) -> i64 {
        self.inner.get_db()
    }
}

/// Spreads a pipeline's outcome over its command descriptors.
///
/// A plain pipeline answers with one reply per command, server errors
/// included. A transaction (non-zero `offset`, the MULTI/QUEUED replies are
/// skipped) answers with a single EXEC array, or nil when a WATCHed key
/// changed and no command ran.
fn record_replies(cmds: &mut [Cmd], offset: usize, result: &RedisResult<Vec<Value>>) {
    let transaction = offset > 0;

    match result {
        Ok(values) => match values.as_slice() {
            [Value::Nil] if transaction => {
                for cmd in cmds.iter_mut() {
                    cmd.set_err(CommandError::Nil);
                }
            }
            [Value::Array(replies)] if transaction => zip_replies(cmds, replies),
            replies => zip_replies(cmds, replies),
        },
        // Nothing came back per command: the transport broke or the
        // transaction was refused as a whole.
        Err(e) if transaction || is_transport_error(e) => {
            warn!(commands = cmds.len(), error = %e, "redis pipeline failed");
            for cmd in cmds.iter_mut() {
                cmd.record_error(e);
            }
        }
        Err(e) => {
            warn!(commands = cmds.len(), error = %e, "redis pipeline failed, not attributed");
        }
    }
}

fn zip_replies(cmds: &mut [Cmd], replies: &[Value]) {
    for (cmd, reply) in cmds.iter_mut().zip(replies) {
        cmd.record_reply(reply);
    }
}

fn is_transport_error(err: &RedisError) -> bool {
    err.is_io_error()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use redis::ErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::command::PIPELINE;
    use crate::metrics::{ConflictPolicy, MetricsHook, MetricsRegistry};
    use crate::options::Options;

    /// Connection answering from a script instead of a server.
    #[derive(Default)]
    struct Scripted {
        replies: VecDeque<RedisResult<Value>>,
        batches: VecDeque<RedisResult<Vec<Value>>>,
    }

    impl ConnectionLike for Scripted {
        fn req_packed_command<'a>(&'a mut self, _cmd: &'a redis::Cmd) -> RedisFuture<'a, Value> {
            let reply = self.replies.pop_front().unwrap_or(Ok(Value::Okay));
            Box::pin(async move { reply })
        }

        fn req_packed_commands<'a>(
            &'a mut self,
            _pipeline: &'a redis::Pipeline,
            _offset: usize,
            _count: usize,
        ) -> RedisFuture<'a, Vec<Value>> {
            let batch = self.batches.pop_front().unwrap_or(Ok(Vec::new()));
            Box::pin(async move { batch })
        }

        fn get_db(&self) -> i64 {
            3
        }
    }

    /// Minimal RESP peer: answers every command it parses with `reply(args)`.
    async fn serve(listener: TcpListener, reply: fn(&[Vec<u8>]) -> &'static [u8]) {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            while let Some((args, used)) = parse_command(&buf) {
                buf.drain(..used);
                if socket.write_all(reply(&args)).await.is_err() {
                    return;
                }
            }
        }
    }

    fn parse_command(buf: &[u8]) -> Option<(Vec<Vec<u8>>, usize)> {
        fn line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
            let rest = &buf[*pos..];
            let end = rest.windows(2).position(|w| w == b"\r\n")?;
            *pos += end + 2;
            Some(&rest[..end])
        }
        fn number(bytes: &[u8]) -> Option<usize> {
            std::str::from_utf8(bytes).ok()?.parse().ok()
        }

        let mut pos = 0;
        let count = number(line(buf, &mut pos)?.strip_prefix(b"*")?)?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let len = number(line(buf, &mut pos)?.strip_prefix(b"$")?)?;
            if buf.len() < pos + len + 2 {
                return None;
            }
            args.push(buf[pos..pos + len].to_vec());
            pos += len + 2;
        }
        Some((args, pos))
    }

    /// `GET a` hits, `GET` anything else misses, `SET` is refused.
    fn wrongtype_on_set(args: &[Vec<u8>]) -> &'static [u8] {
        let name = args[0].to_ascii_uppercase();
        match (name.as_slice(), args.get(1).map(Vec::as_slice)) {
            (b"GET", Some(b"a")) => &b"$1\r\n1\r\n"[..],
            (b"GET", _) => &b"$-1\r\n"[..],
            (b"SET", _) => &b"-WRONGTYPE wrong kind of value\r\n"[..],
            _ => &b"+OK\r\n"[..],
        }
    }

    fn instrumented<C>(conn: C) -> (InstrumentedConnection<C>, MetricsHook) {
        let metrics = MetricsHook::register(
            &MetricsRegistry::new(),
            Options::default().instance_name("cache"),
            ConflictPolicy::Reuse,
        )
        .unwrap();
        let hooks = Hooks::builder().hook(metrics.clone()).build();
        (InstrumentedConnection::new(conn, hooks), metrics)
    }

    fn latency_count(metrics: &MetricsHook, command: &str) -> u64 {
        metrics
            .single_commands()
            .with_label_values(&["cache", command])
            .get_sample_count()
    }

    fn count(counter: &prometheus::CounterVec, command: &str) -> f64 {
        counter.with_label_values(&["cache", command]).get()
    }

    #[tokio::test]
    async fn absent_key_is_not_an_error() {
        let mut script = Scripted::default();
        script.replies.push_back(Ok(Value::Nil));
        let (mut conn, metrics) = instrumented(script);

        let value: Option<String> = redis::cmd("GET")
            .arg("user:missing")
            .query_async(&mut conn)
            .await
            .unwrap();

        assert_eq!(value, None);
        assert_eq!(latency_count(&metrics, "get"), 1);
        assert_eq!(count(metrics.single_errors(), "get"), 0.0);
    }

    #[tokio::test]
    async fn command_failure_is_counted_and_returned() {
        let mut script = Scripted::default();
        script
            .replies
            .push_back(Err((ErrorKind::IoError, "connection refused").into()));
        let (mut conn, metrics) = instrumented(script);

        let result: RedisResult<()> = redis::cmd("SET")
            .arg("k")
            .arg("v")
            .query_async(&mut conn)
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::IoError);
        assert_eq!(latency_count(&metrics, "set"), 1);
        assert_eq!(count(metrics.single_errors(), "set"), 1.0);
    }

    #[tokio::test]
    async fn pipeline_counts_each_command() {
        let mut script = Scripted::default();
        script.batches.push_back(Ok(vec![
            Value::BulkString(b"1".to_vec()),
            Value::Okay,
            Value::Nil,
        ]));
        let (mut conn, metrics) = instrumented(script);

        let mut pipe = redis::pipe();
        pipe.cmd("GET").arg("a").cmd("SET").arg("b").arg("2").cmd("GET").arg("c");
        let replies: Vec<Value> = pipe.query_async(&mut conn).await.unwrap();

        assert_eq!(replies.len(), 3);
        assert_eq!(latency_count(&metrics, PIPELINE), 1);
        assert_eq!(latency_count(&metrics, "get"), 0);
        assert_eq!(count(metrics.pipelined_commands(), "get"), 2.0);
        assert_eq!(count(metrics.pipelined_commands(), "set"), 1.0);
        assert_eq!(count(metrics.pipelined_errors(), "get"), 0.0);
    }

    #[tokio::test]
    async fn server_error_in_pipeline_counts_only_its_command() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, wrongtype_on_set));

        let client = redis::Client::open(format!("redis://{addr}/")).unwrap();
        let inner = client.get_multiplexed_async_connection().await.unwrap();
        let (mut conn, metrics) = instrumented(inner);

        let mut pipe = redis::pipe();
        pipe.cmd("GET").arg("a").cmd("SET").arg("b").arg("2").cmd("GET").arg("c");
        let _: RedisResult<Vec<Value>> = pipe.query_async(&mut conn).await;

        assert_eq!(latency_count(&metrics, PIPELINE), 1);
        assert_eq!(count(metrics.pipelined_commands(), "get"), 2.0);
        assert_eq!(count(metrics.pipelined_commands(), "set"), 1.0);
        assert_eq!(count(metrics.pipelined_errors(), "set"), 1.0);
        assert_eq!(count(metrics.pipelined_errors(), "get"), 0.0);
    }

    #[tokio::test]
    async fn broken_transport_marks_every_command() {
        let mut script = Scripted::default();
        script
            .batches
            .push_back(Err((ErrorKind::IoError, "broken pipe").into()));
        let (mut conn, metrics) = instrumented(script);

        let mut pipe = redis::pipe();
        pipe.cmd("INCR").arg("n").cmd("INCR").arg("m");
        let res: RedisResult<Vec<Value>> = pipe.query_async(&mut conn).await;

        assert!(res.is_err());
        assert_eq!(latency_count(&metrics, PIPELINE), 1);
        assert_eq!(count(metrics.pipelined_commands(), "incr"), 2.0);
        assert_eq!(count(metrics.pipelined_errors(), "incr"), 2.0);
    }

    #[test]
    fn unattributable_batch_error_marks_no_command() {
        let mut cmds = vec![Cmd::new("get"), Cmd::new("set")];
        let result: RedisResult<Vec<Value>> = Err((ErrorKind::ResponseError, "unexpected").into());

        record_replies(&mut cmds, 0, &result);

        assert!(cmds.iter().all(|c| c.err().is_none()));
    }

    #[test]
    fn refused_transaction_marks_every_command() {
        let mut cmds = vec![Cmd::new("incr"), Cmd::new("set")];
        let result: RedisResult<Vec<Value>> = Err((ErrorKind::ExecAbortError, "EXECABORT").into());

        record_replies(&mut cmds, 3, &result);

        assert!(cmds.iter().all(is_failed));
    }

    #[test]
    fn transaction_replies_come_from_exec_array() {
        let mut cmds = vec![Cmd::new("get"), Cmd::new("get")];
        let result = Ok(vec![Value::Array(vec![
            Value::Nil,
            Value::BulkString(b"x".to_vec()),
        ])]);

        record_replies(&mut cmds, 3, &result);

        assert_eq!(cmds[0].err(), Some(&CommandError::Nil));
        assert_eq!(cmds[1].err(), None);
    }

    #[test]
    fn aborted_transaction_ran_no_command() {
        let mut cmds = vec![Cmd::new("get"), Cmd::new("set"), Cmd::new("incr")];

        record_replies(&mut cmds, 4, &Ok(vec![Value::Nil]));

        assert!(cmds.iter().all(|c| c.err() == Some(&CommandError::Nil)));
    }

    #[test]
    fn delegates_database_index() {
        let (conn, _) = instrumented(Scripted::default());
        assert_eq!(conn.get_db(), 3);
    }

    fn is_failed(cmd: &Cmd) -> bool {
        matches!(cmd.err(), Some(CommandError::Failed(_)))
    }
}
