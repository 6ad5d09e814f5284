//! A group of connection tasks driven by one thread.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::completion::{Completion, CompletionQueue, CompletionSender, Notify};
use crate::config::Config;
use crate::connection::{ConnToken, ConnectionInfo, ConnectionTable};
use crate::error::Error;
use crate::executor::Executor;
use crate::metrics;
use crate::protocol::ProtocolAdapter;
use crate::stats::StatisticsSink;
use crate::task::{CommTask, WriteStatus};

/// Owns the connection tasks of one event-loop thread, the executor they
/// dispatch to, and the completion queue results come back through.
///
/// The socket layer calls the `on_*` methods with the [`ConnToken`] returned
/// by [`register`](Self::register) and calls
/// [`process_completions`](Self::process_completions) whenever the
/// [`Notify`] hook fires (or on every loop iteration).
pub struct CommLoop<P: ProtocolAdapter, E> {
    config: Config,
    tasks: ConnectionTable<CommTask<P>>,
    executor: E,
    completions: CompletionQueue<P::Response>,
    stats_sink: Option<Arc<dyn StatisticsSink>>,
}

impl<P, E> CommLoop<P, E>
where
    P: ProtocolAdapter,
    E: Executor<P::Request, P::Response>,
{
    pub fn new(config: Config, executor: E) -> Result<Self, Error> {
        Self::build(config, executor, None)
    }

    /// Like [`new`](Self::new), waking `notify` after every queued completion.
    pub fn with_notify(config: Config, executor: E, notify: Arc<dyn Notify>) -> Result<Self, Error> {
        Self::build(config, executor, Some(notify))
    }

    fn build(config: Config, executor: E, notify: Option<Arc<dyn Notify>>) -> Result<Self, Error> {
        config.validate()?;
        Ok(CommLoop {
            tasks: ConnectionTable::new(config.max_connections),
            config,
            executor,
            completions: CompletionQueue::new(notify),
            stats_sink: None,
        })
    }

    /// Statistics sink for connections registered from now on.
    pub fn set_statistics_sink(&mut self, sink: Arc<dyn StatisticsSink>) {
        self.stats_sink = Some(sink);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// A sender for completions produced outside a [`Job`](crate::Job).
    pub fn completion_sender(&self) -> CompletionSender<P::Response> {
        self.completions.sender()
    }

    pub fn active_connections(&self) -> usize {
        self.tasks.active_count()
    }

    /// Register a newly accepted connection.
    pub fn register(&mut self, info: ConnectionInfo, adapter: P) -> Result<ConnToken, Error> {
        let sender = self.completions.sender();
        let config = &self.config;
        let sink = self.stats_sink.clone();
        let peer = info.peer_addr;
        let protocol = adapter.protocol();
        let token = self
            .tasks
            .insert_with(|token| {
                let mut task = CommTask::new(token, info, adapter, config, sender);
                if let Some(sink) = sink {
                    task.set_statistics_sink(sink);
                }
                task
            })
            .ok_or(Error::ConnectionLimitReached)?;
        metrics::CONNECTIONS_OPENED.increment();
        metrics::CONNECTIONS_ACTIVE.increment();
        debug!(conn = token.index(), %peer, protocol, "connection registered");
        Ok(token)
    }

    pub fn task(&self, token: ConnToken) -> Option<&CommTask<P>> {
        self.tasks.get(token)
    }

    pub fn on_readable(&mut self, token: ConnToken, data: &[u8]) -> Result<(), Error> {
        let task = self.tasks.get_mut(token).ok_or(Error::InvalidConnection)?;
        task.on_readable(data, &mut self.executor);
        Ok(())
    }

    /// Drain the connection's queued responses into `sink`.
    ///
    /// On [`WriteStatus::Close`] or a write error the task is closed; its slot
    /// is released once no request is pending.
    pub fn on_writable<W>(&mut self, token: ConnToken, sink: &mut W) -> Result<WriteStatus, Error>
    where
        W: Write + ?Sized,
    {
        let task = self.tasks.get_mut(token).ok_or(Error::InvalidConnection)?;
        let result = task.on_writable(sink, &mut self.executor);
        if matches!(result, Ok(WriteStatus::Close) | Err(_)) {
            task.close();
            self.release_if_finished(token);
        }
        result
    }

    pub fn on_timeout(&mut self, token: ConnToken) -> Result<(), Error> {
        let task = self.tasks.get_mut(token).ok_or(Error::InvalidConnection)?;
        task.on_timeout();
        Ok(())
    }

    /// The peer hung up or the socket failed.
    pub fn close(&mut self, token: ConnToken) -> Result<(), Error> {
        let task = self.tasks.get_mut(token).ok_or(Error::InvalidConnection)?;
        task.close();
        self.release_if_finished(token);
        Ok(())
    }

    /// Apply every queued completion. Returns the number applied.
    pub fn process_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Some(completion) = self.completions.try_recv() {
            self.apply(completion);
            applied += 1;
        }
        applied
    }

    /// Block up to `timeout` for the first completion, then apply all queued.
    pub fn wait_completions(&mut self, timeout: Duration) -> usize {
        match self.completions.recv_timeout(timeout) {
            Some(completion) => {
                self.apply(completion);
                1 + self.process_completions()
            }
            None => 0,
        }
    }

    fn apply(&mut self, completion: Completion<P::Response>) {
        let token = completion.token;
        let Some(task) = self.tasks.get_mut(token) else {
            metrics::COMPLETIONS_STALE.increment();
            debug!(conn = token.index(), handle = %completion.handle, "completion for released connection dropped");
            return;
        };
        if let Err(err) = task.apply_completion(completion, &mut self.executor) {
            debug!(conn = token.index(), error = %err, "completion rejected");
        }
        self.release_if_finished(token);
    }

    /// Time out connections whose keep-alive deadline has passed.
    ///
    /// Returns the tokens that timed out; they are idle, so they are ready
    /// to be flushed and closed by the socket layer.
    pub fn expire_idle(&mut self, now: Instant) -> Vec<ConnToken> {
        let mut expired = Vec::new();
        for token in self.tasks.tokens() {
            let Some(task) = self.tasks.get_mut(token) else {
                continue;
            };
            if task.idle_deadline().is_some_and(|deadline| deadline <= now) {
                metrics::CONNECTIONS_IDLE_TIMEOUT.increment();
                trace!(conn = token.index(), "keep-alive timeout");
                task.on_timeout();
                expired.push(token);
            }
        }
        expired
    }

    /// The earliest keep-alive deadline across idle connections.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks
            .tokens()
            .into_iter()
            .filter_map(|token| self.tasks.get(token)?.idle_deadline())
            .min()
    }

    fn release_if_finished(&mut self, token: ConnToken) {
        if !self.tasks.get(token).is_some_and(CommTask::is_finished) {
            return;
        }
        if self.tasks.remove(token).is_some() {
            metrics::CONNECTIONS_CLOSED.increment();
            metrics::CONNECTIONS_ACTIVE.decrement();
            debug!(conn = token.index(), "connection released");
        }
    }
}
