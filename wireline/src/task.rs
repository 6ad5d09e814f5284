//! The per-connection communication task.
//!
//! A `CommTask` sits between the socket layer and the executor. The socket
//! layer feeds it bytes ([`on_readable`](CommTask::on_readable)) and drains
//! it ([`on_writable`](CommTask::on_writable)); the executor reports results
//! through the completion queue, which the owning thread applies with
//! [`apply_completion`](CommTask::apply_completion). All methods run on the
//! owning thread and never block.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, error, warn};

use crate::accumulator::RecvAccumulator;
use crate::completion::{Completion, CompletionSender};
use crate::config::Config;
use crate::connection::{ConnToken, ConnectionInfo};
use crate::error::{Error, LifecycleError, SubmitError};
use crate::executor::{Executor, Job};
use crate::handles::{HandleId, HandleTable, Parked};
use crate::metrics;
use crate::protocol::{
    Concurrency, CorrelationId, Framed, InvalidFrame, ProtocolAdapter, Reply, SimpleError,
};
use crate::stats::{RequestStatistics, StatisticsSink};
use crate::write_queue::{Drain, Flushed, WriteQueue};

fn record_flushed(stats_sink: Option<&Arc<dyn StatisticsSink>>, flushed: Flushed) {
    metrics::BYTES_SENT.add(flushed.bytes as u64);
    if let (Some(sink), Some(stats)) = (stats_sink, flushed.stats) {
        sink.record(stats);
    }
}

/// What the socket layer should do after [`CommTask::on_writable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Nothing left to write.
    Idle,
    /// The sink would block with bytes still queued; wait for writability.
    Blocked,
    /// Everything is flushed and the connection should be closed.
    Close,
}

/// Drives one connection through read, parse, dispatch and respond.
pub struct CommTask<P: ProtocolAdapter> {
    token: ConnToken,
    info: Arc<ConnectionInfo>,
    adapter: P,
    read_buf: RecvAccumulator,
    write_queue: WriteQueue,
    handles: HandleTable<P::Request>,
    completions: CompletionSender<P::Response>,
    stats_sink: Option<Arc<dyn StatisticsSink>>,
    keep_alive_timeout: Option<Duration>,
    read_start: Option<Instant>,
    last_activity: Instant,
    close_requested: bool,
    closed: bool,
}

impl<P: ProtocolAdapter> CommTask<P> {
    pub fn new(
        token: ConnToken,
        info: ConnectionInfo,
        adapter: P,
        config: &Config,
        completions: CompletionSender<P::Response>,
    ) -> Self {
        let limit = match adapter.concurrency() {
            Concurrency::SingleInFlight => 1,
            Concurrency::Multiplexed => config.max_in_flight,
        };
        let keep_alive_timeout = info.keep_alive_timeout.or(config.keep_alive_timeout);
        CommTask {
            token,
            info: Arc::new(info),
            adapter,
            read_buf: RecvAccumulator::new(config.read_buffer_capacity),
            write_queue: WriteQueue::new(config.write_queue_soft_cap),
            handles: HandleTable::new(limit),
            completions,
            stats_sink: None,
            keep_alive_timeout,
            read_start: None,
            last_activity: Instant::now(),
            close_requested: false,
            closed: false,
        }
    }

    /// Hand the statistics of every fully written response to `sink`.
    pub fn set_statistics_sink(&mut self, sink: Arc<dyn StatisticsSink>) {
        self.stats_sink = Some(sink);
    }

    pub fn token(&self) -> ConnToken {
        self.token
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn adapter(&self) -> &P {
        &self.adapter
    }

    /// Protocol revision currently spoken on this connection.
    pub fn protocol_version(&self) -> &'static str {
        self.adapter.protocol_version()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Requests handed to the executor and not yet completed.
    pub fn pending_count(&self) -> usize {
        self.handles.pending_count()
    }

    /// Requests waiting behind a pending request with the same correlation id.
    pub fn parked_count(&self) -> usize {
        self.handles.parked_count()
    }

    /// Bytes buffered but not yet framed.
    pub fn buffered_bytes(&self) -> usize {
        self.read_buf.len()
    }

    /// Encoded response bytes waiting to be written.
    pub fn queued_bytes(&self) -> usize {
        self.write_queue.queued_bytes()
    }

    /// Correlation ids of queued responses, in write order.
    pub fn queued_correlations(&self) -> Vec<CorrelationId> {
        self.write_queue.correlations().collect()
    }

    fn can_admit(&self) -> bool {
        !self.closed
            && !self.close_requested
            && !self.write_queue.is_over_cap()
            && self.handles.has_capacity()
    }

    /// Whether the socket layer should keep reading.
    pub fn wants_read(&self) -> bool {
        self.can_admit()
    }

    pub fn wants_write(&self) -> bool {
        !self.closed && !self.write_queue.is_empty()
    }

    /// Close was requested and nothing is left to write or wait for.
    pub fn should_close(&self) -> bool {
        self.closed
            || (self.close_requested && self.write_queue.is_empty() && self.handles.is_idle())
    }

    /// Closed with no pending handles: the connection context may be released.
    pub fn is_finished(&self) -> bool {
        self.closed && self.handles.pending_count() == 0
    }

    /// When the keep-alive timeout expires, if the connection is idle.
    pub fn idle_deadline(&self) -> Option<Instant> {
        if self.closed || !self.handles.is_idle() || !self.write_queue.is_empty() {
            return None;
        }
        self.keep_alive_timeout.map(|t| self.last_activity + t)
    }

    /// Feed newly received bytes and dispatch every complete request.
    pub fn on_readable<E>(&mut self, data: &[u8], executor: &mut E)
    where
        E: Executor<P::Request, P::Response>,
    {
        if self.closed || data.is_empty() {
            return;
        }
        metrics::BYTES_RECEIVED.add(data.len() as u64);
        self.last_activity = Instant::now();
        if self.close_requested {
            debug!(conn = self.token.index(), bytes = data.len(), "discarding input after close request");
            return;
        }
        if self.read_buf.is_empty() {
            self.read_start = Some(self.last_activity);
        }
        self.read_buf.append(data);
        self.process_input(executor);
    }

    fn process_input<E>(&mut self, executor: &mut E)
    where
        E: Executor<P::Request, P::Response>,
    {
        while self.can_admit() && !self.read_buf.is_empty() {
            match self.adapter.frame(self.read_buf.data()) {
                Framed::Incomplete => break,
                Framed::Control { consumed } => {
                    if !self.consume(consumed) {
                        break;
                    }
                }
                Framed::Complete { request, consumed } => {
                    let stats = self.begin_stats(consumed);
                    if !self.consume(consumed) {
                        break;
                    }
                    if self.adapter.wants_close(&request) {
                        debug!(conn = self.token.index(), "peer requested close");
                        self.close_requested = true;
                    }
                    self.admit(request, stats, executor);
                }
                Framed::Invalid(invalid) => self.on_invalid(invalid),
            }
        }
    }

    /// Drop `n` framed bytes. A zero-length frame would never make progress,
    /// so it is treated as corrupt framing.
    fn consume(&mut self, n: usize) -> bool {
        if n == 0 || n > self.read_buf.len() {
            error!(
                conn = self.token.index(),
                protocol = self.adapter.protocol(),
                consumed = n,
                buffered = self.read_buf.len(),
                "adapter reported an impossible frame length"
            );
            self.on_invalid(InvalidFrame::fatal(
                SimpleError::internal("framing error"),
                self.adapter.connection_error_id(),
            ));
            return false;
        }
        self.read_buf.consume(n);
        if !self.read_buf.is_empty() {
            self.read_start = Some(Instant::now());
        }
        true
    }

    fn begin_stats(&mut self, consumed: usize) -> RequestStatistics {
        let now = Instant::now();
        let mut stats = RequestStatistics::new(self.adapter.protocol());
        stats.protocol_version = self.adapter.protocol_version();
        stats.read_start = self.read_start.take().or(Some(now));
        stats.read_end = Some(now);
        stats.bytes_received = consumed;
        stats
    }

    fn on_invalid(&mut self, invalid: InvalidFrame) {
        metrics::REQUESTS_INVALID.increment();
        warn!(
            conn = self.token.index(),
            peer = %self.info.peer_addr,
            protocol = self.adapter.protocol(),
            correlation = invalid.correlation,
            recoverable = invalid.recoverable,
            error = %invalid.error,
            "invalid request"
        );
        if invalid.recoverable && invalid.consumed > 0 && invalid.consumed <= self.read_buf.len() {
            let stats = self.begin_stats(invalid.consumed);
            self.read_buf.consume(invalid.consumed);
            if !self.read_buf.is_empty() {
                self.read_start = Some(Instant::now());
            }
            if self.handles.is_correlation_pending(invalid.correlation) {
                self.handles.park(
                    invalid.correlation,
                    Parked::Error {
                        error: invalid.error,
                        stats,
                    },
                );
            } else {
                self.encode_and_enqueue(Reply::Error(invalid.error), invalid.correlation, stats);
            }
        } else {
            let stats = self.begin_stats(self.read_buf.len());
            self.read_buf.reset();
            self.close_requested = true;
            self.encode_and_enqueue(Reply::Error(invalid.error), invalid.correlation, stats);
        }
    }

    fn admit<E>(&mut self, request: P::Request, stats: RequestStatistics, executor: &mut E)
    where
        E: Executor<P::Request, P::Response>,
    {
        let correlation = self.adapter.correlation_id(&request);
        if self.handles.is_correlation_pending(correlation) {
            debug!(conn = self.token.index(), correlation, "request parked behind pending id");
            self.handles.park(correlation, Parked::Request { request, stats });
            return;
        }
        self.dispatch(request, correlation, stats, executor);
    }

    fn dispatch<E>(
        &mut self,
        request: P::Request,
        correlation: CorrelationId,
        mut stats: RequestStatistics,
        executor: &mut E,
    ) where
        E: Executor<P::Request, P::Response>,
    {
        stats.dispatched = Some(Instant::now());
        stats.correlation = correlation;
        let id = self.handles.register(correlation, stats);
        metrics::REQUESTS_IN_FLIGHT.increment();
        let job = Job {
            request,
            completer: self.completions.completer(self.token, id),
            info: Arc::clone(&self.info),
        };
        match executor.submit(job) {
            Ok(()) => {
                metrics::REQUESTS_DISPATCHED.increment();
                debug!(conn = self.token.index(), handle = %id, correlation, "request dispatched");
            }
            Err(err) => {
                metrics::REQUESTS_REJECTED.increment();
                warn!(conn = self.token.index(), handle = %id, error = %err, "executor refused request");
                let error = match err {
                    SubmitError::QueueFull => SimpleError::queue_full(),
                    SubmitError::Shutdown => SimpleError::shutting_down(),
                };
                if let Err(err) = self.finish(id, Err(error), executor) {
                    debug!(conn = self.token.index(), handle = %id, error = %err, "refused request not answered");
                }
            }
        }
    }

    /// Apply one completion on the owning thread.
    ///
    /// A partial completion queues one part of a streamed response and
    /// leaves the handle pending. Lifecycle violations are logged, counted
    /// and returned; they never touch the write queue.
    pub fn apply_completion<E>(
        &mut self,
        completion: Completion<P::Response>,
        executor: &mut E,
    ) -> Result<(), LifecycleError>
    where
        E: Executor<P::Request, P::Response>,
    {
        let Completion {
            handle,
            outcome,
            partial,
            ..
        } = completion;
        match (partial, outcome) {
            (true, Ok(part)) => self.apply_part(handle, part),
            (_, outcome) => {
                self.finish(handle, outcome, executor)?;
                self.process_input(executor);
                Ok(())
            }
        }
    }

    fn apply_part(&mut self, id: HandleId, part: P::Response) -> Result<(), LifecycleError> {
        let checked = self.handles.pending(id).and_then(|handle| {
            if self.adapter.supports_partial() {
                Ok(handle.correlation)
            } else {
                Err(LifecycleError::PartialUnsupported(id))
            }
        });
        let correlation = match checked {
            Ok(correlation) => correlation,
            Err(err) => {
                metrics::LIFECYCLE_VIOLATIONS.increment();
                error!(conn = self.token.index(), peer = %self.info.peer_addr, error = %err, "lifecycle violation");
                return Err(err);
            }
        };
        if self.closed {
            debug!(conn = self.token.index(), handle = %id, "partial response for closed connection dropped");
            return Ok(());
        }
        metrics::RESPONSE_PARTS.increment();
        let mut buf = BytesMut::new();
        self.adapter.encode(&Reply::Partial(part), correlation, &mut buf);
        self.enqueue(buf, correlation, None);
        Ok(())
    }

    fn finish<E>(
        &mut self,
        id: HandleId,
        outcome: Result<P::Response, SimpleError>,
        executor: &mut E,
    ) -> Result<(), LifecycleError>
    where
        E: Executor<P::Request, P::Response>,
    {
        let handle = match self.handles.complete(id, outcome.is_err()) {
            Ok(handle) => handle,
            Err(err) => {
                metrics::LIFECYCLE_VIOLATIONS.increment();
                error!(conn = self.token.index(), peer = %self.info.peer_addr, error = %err, "lifecycle violation");
                return Err(err);
            }
        };
        metrics::REQUESTS_IN_FLIGHT.decrement();
        let reply = match outcome {
            Ok(response) => {
                metrics::REQUESTS_COMPLETED.increment();
                Reply::Response(response)
            }
            Err(error) => {
                metrics::REQUESTS_FAILED.increment();
                debug!(conn = self.token.index(), handle = %id, error = %error, "request failed");
                Reply::Error(error)
            }
        };
        if self.closed {
            debug!(conn = self.token.index(), handle = %id, "completion for closed connection dropped");
            return Ok(());
        }
        self.encode_and_enqueue(reply, handle.correlation, handle.stats);
        self.release_parked(handle.correlation, executor);
        Ok(())
    }

    /// Dispatch whatever was waiting on `correlation`, in arrival order.
    fn release_parked<E>(&mut self, correlation: CorrelationId, executor: &mut E)
    where
        E: Executor<P::Request, P::Response>,
    {
        while !self.handles.is_correlation_pending(correlation) {
            match self.handles.unpark(correlation) {
                None => break,
                Some(Parked::Request { request, stats }) => {
                    self.dispatch(request, correlation, stats, executor)
                }
                Some(Parked::Error { error, stats }) => {
                    self.encode_and_enqueue(Reply::Error(error), correlation, stats)
                }
            }
        }
    }

    fn encode_and_enqueue(
        &mut self,
        reply: Reply<P::Response>,
        correlation: CorrelationId,
        mut stats: RequestStatistics,
    ) {
        let mut buf = BytesMut::new();
        self.adapter.encode(&reply, correlation, &mut buf);
        stats.completed = Some(Instant::now());
        stats.correlation = correlation;
        stats.error = reply.is_error();
        self.enqueue(buf, correlation, Some(stats));
    }

    fn enqueue(&mut self, buf: BytesMut, correlation: CorrelationId, stats: Option<RequestStatistics>) {
        let was_over_cap = self.write_queue.is_over_cap();
        if let Some(flushed) = self.write_queue.push(buf.freeze(), stats, correlation) {
            warn!(
                conn = self.token.index(),
                protocol = self.adapter.protocol(),
                correlation,
                "adapter encoded an empty reply"
            );
            record_flushed(self.stats_sink.as_ref(), flushed);
            return;
        }
        if !was_over_cap && self.write_queue.is_over_cap() {
            metrics::BACKPRESSURE_ENGAGED.increment();
            debug!(
                conn = self.token.index(),
                queued = self.write_queue.queued_bytes(),
                "write queue over soft cap, pausing input"
            );
        }
    }

    /// Stop accepting requests. Pending requests still complete and flush.
    pub fn on_timeout(&mut self) {
        if !self.close_requested {
            debug!(conn = self.token.index(), pending = self.handles.pending_count(), "timeout, closing after flush");
            self.close_requested = true;
        }
    }

    /// Drain queued responses into `sink` in FIFO order.
    ///
    /// Resumes parsing whenever the drain leaves the queue under the soft
    /// cap, including when the sink then blocks. On a write error the task
    /// is closed and the error returned.
    pub fn on_writable<W, E>(&mut self, sink: &mut W, executor: &mut E) -> Result<WriteStatus, Error>
    where
        W: Write + ?Sized,
        E: Executor<P::Request, P::Response>,
    {
        if self.closed {
            return Ok(WriteStatus::Close);
        }
        let stats_sink = self.stats_sink.clone();
        let mut on_flushed = |flushed: Flushed| record_flushed(stats_sink.as_ref(), flushed);

        loop {
            let drain = match self.write_queue.drain_to(&mut *sink, &mut on_flushed) {
                Ok(drain) => drain,
                Err(err) => {
                    warn!(conn = self.token.index(), peer = %self.info.peer_addr, error = %err, "write failed");
                    self.close();
                    return Err(Error::Io(err));
                }
            };
            self.last_activity = Instant::now();
            // A drain that blocks may still have lifted backpressure.
            if !self.write_queue.is_over_cap() {
                self.process_input(executor);
            }
            if drain == Drain::Blocked {
                return Ok(WriteStatus::Blocked);
            }
            if self.write_queue.is_empty() {
                break;
            }
        }

        if self.should_close() {
            Ok(WriteStatus::Close)
        } else {
            Ok(WriteStatus::Idle)
        }
    }

    /// The connection is gone: drop partial input and unsent responses.
    ///
    /// Pending handles stay tracked until their completions arrive, so the
    /// task is not [finished](Self::is_finished) before then.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.close_requested = true;
        let partial = self.read_buf.len();
        self.read_buf.reset();
        let unsent = self.write_queue.clear();
        let parked = self.handles.clear_parked();
        debug!(
            conn = self.token.index(),
            peer = %self.info.peer_addr,
            partial,
            unsent,
            parked,
            pending = self.handles.pending_count(),
            "connection closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionQueue;
    use crate::protocol::{ResponseCode, error_num};

    /// Newline-terminated frames: `<id> <body>\n`. Requests starting with
    /// `!` are malformed but well delimited; `#` is corrupt framing.
    struct Lines {
        concurrency: Concurrency,
    }

    impl ProtocolAdapter for Lines {
        type Request = (u64, String);
        type Response = String;

        fn protocol(&self) -> &'static str {
            "lines"
        }

        fn protocol_version(&self) -> &'static str {
            "LINES/1"
        }

        fn concurrency(&self) -> Concurrency {
            self.concurrency
        }

        fn frame(&mut self, data: &[u8]) -> Framed<(u64, String)> {
            let Some(end) = data.iter().position(|&b| b == b'\n') else {
                return Framed::Incomplete;
            };
            let line = String::from_utf8_lossy(&data[..end]).into_owned();
            if line.starts_with('#') {
                return Framed::Invalid(InvalidFrame::fatal(SimpleError::bad_request("corrupt"), 0));
            }
            let (id, body) = line.split_once(' ').unwrap_or((line.as_str(), ""));
            if let Some(id) = id.strip_prefix('!') {
                let correlation = match self.concurrency {
                    Concurrency::SingleInFlight => 0,
                    Concurrency::Multiplexed => id.parse().unwrap_or(0),
                };
                return Framed::Invalid(InvalidFrame::recoverable(
                    SimpleError::bad_request("malformed"),
                    correlation,
                    end + 1,
                ));
            }
            Framed::Complete {
                request: (id.parse().unwrap_or(0), body.to_string()),
                consumed: end + 1,
            }
        }

        fn encode(&mut self, reply: &Reply<String>, correlation: CorrelationId, out: &mut BytesMut) {
            let text = match reply {
                Reply::Response(body) if body.is_empty() => String::new(),
                Reply::Response(body) | Reply::Partial(body) => format!("{correlation} {body}\n"),
                Reply::Error(err) => format!("{correlation} ERR {}\n", err.code),
            };
            out.extend_from_slice(text.as_bytes());
        }

        fn correlation_id(&self, request: &(u64, String)) -> CorrelationId {
            match self.concurrency {
                Concurrency::SingleInFlight => 0,
                Concurrency::Multiplexed => request.0,
            }
        }

        fn wants_close(&self, request: &(u64, String)) -> bool {
            request.1 == "bye"
        }
    }

    type Jobs = Vec<Job<(u64, String), String>>;

    fn task(concurrency: Concurrency, config: &Config) -> (CommTask<Lines>, CompletionQueue<String>) {
        let queue = CompletionQueue::default();
        let task = CommTask::new(
            ConnToken::default(),
            ConnectionInfo::new("10.0.0.1:5000".parse().unwrap()),
            Lines { concurrency },
            config,
            queue.sender(),
        );
        (task, queue)
    }

    fn collect(jobs: &mut Jobs) -> impl FnMut(Job<(u64, String), String>) -> Result<(), SubmitError> + '_ {
        move |job| {
            jobs.push(job);
            Ok(())
        }
    }

    fn flush(task: &mut CommTask<Lines>, jobs: &mut Jobs) -> (String, WriteStatus) {
        let mut out = Vec::new();
        let status = task.on_writable(&mut out, &mut collect(jobs)).unwrap();
        (String::from_utf8(out).unwrap(), status)
    }

    fn drain(task: &mut CommTask<Lines>, queue: &CompletionQueue<String>, jobs: &mut Jobs) {
        while let Some(c) = queue.try_recv() {
            task.apply_completion(c, &mut collect(jobs)).unwrap();
        }
    }

    #[test]
    fn single_in_flight_holds_second_request() {
        let (mut task, queue) = task(Concurrency::SingleInFlight, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"1 a\n2 b\n", &mut collect(&mut jobs));
        assert_eq!(jobs.len(), 1);
        assert_eq!(task.pending_count(), 1);
        assert_eq!(task.buffered_bytes(), 4);
        assert!(!task.wants_read());

        jobs.remove(0).completer.respond("A".into());
        drain(&mut task, &queue, &mut jobs);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].request.1, "b");
        jobs.remove(0).completer.respond("B".into());
        drain(&mut task, &queue, &mut jobs);

        assert_eq!(flush(&mut task, &mut jobs), ("0 A\n0 B\n".into(), WriteStatus::Idle));
    }

    #[test]
    fn recoverable_error_keeps_connection() {
        let (mut task, _queue) = task(Concurrency::SingleInFlight, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"!1 x\n2 ok\n", &mut collect(&mut jobs));
        assert_eq!(jobs.len(), 1);
        assert!(!task.close_requested());
        let (out, _) = flush(&mut task, &mut jobs);
        assert_eq!(out, "0 ERR 400\n");
    }

    #[test]
    fn fatal_error_closes_after_flush() {
        let (mut task, _queue) = task(Concurrency::SingleInFlight, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"#garbage\n1 never\n", &mut collect(&mut jobs));
        assert!(jobs.is_empty());
        assert!(task.close_requested());
        assert_eq!(task.buffered_bytes(), 0);
        assert_eq!(flush(&mut task, &mut jobs), ("0 ERR 400\n".into(), WriteStatus::Close));
    }

    #[test]
    fn refused_submit_answers_503() {
        let (mut task, _queue) = task(Concurrency::SingleInFlight, &Config::default());
        let mut refuse = |_job: Job<(u64, String), String>| -> Result<(), SubmitError> {
            Err(SubmitError::QueueFull)
        };
        task.on_readable(b"1 a\n2 b\n", &mut refuse);
        assert_eq!(task.pending_count(), 0);
        let mut out = Vec::new();
        task.on_writable(&mut out, &mut refuse).unwrap();
        assert_eq!(out, b"0 ERR 503\n0 ERR 503\n");
    }

    #[test]
    fn double_completion_leaves_queue_untouched() {
        let (mut task, queue) = task(Concurrency::SingleInFlight, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"1 a\n", &mut collect(&mut jobs));
        let job = jobs.remove(0);
        job.completer.respond("first".into());
        job.completer.respond("second".into());

        let first = queue.try_recv().unwrap();
        task.apply_completion(first, &mut collect(&mut jobs)).unwrap();
        let queued = task.queued_bytes();

        let second = queue.try_recv().unwrap();
        let err = task.apply_completion(second, &mut collect(&mut jobs)).unwrap_err();
        assert_eq!(err, LifecycleError::DoubleCompletion(job.completer.handle()));
        assert_eq!(task.queued_bytes(), queued);
    }

    #[test]
    fn multiplexed_parks_duplicate_ids() {
        let (mut task, queue) = task(Concurrency::Multiplexed, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"7 a\n8 b\n7 c\n", &mut collect(&mut jobs));
        assert_eq!(jobs.len(), 2);
        assert_eq!(task.parked_count(), 1);

        // id 8 finishes first and may overtake id 7.
        jobs.remove(1).completer.respond("B".into());
        jobs.remove(0).completer.respond("A".into());
        drain(&mut task, &queue, &mut jobs);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].request.1, "c");
        jobs.remove(0).completer.respond("C".into());
        drain(&mut task, &queue, &mut jobs);

        assert_eq!(task.queued_correlations(), vec![8, 7, 7]);
        let (out, _) = flush(&mut task, &mut jobs);
        assert_eq!(out, "8 B\n7 A\n7 C\n");
    }

    #[test]
    fn timeout_with_pending_request() {
        let (mut task, queue) = task(Concurrency::SingleInFlight, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"1 slow\n", &mut collect(&mut jobs));
        task.on_timeout();
        assert!(!task.should_close());

        task.on_readable(b"2 late\n", &mut collect(&mut jobs));
        assert_eq!(jobs.len(), 1);

        jobs.remove(0).completer.respond("done".into());
        drain(&mut task, &queue, &mut jobs);
        assert_eq!(flush(&mut task, &mut jobs), ("0 done\n".into(), WriteStatus::Close));
    }

    #[test]
    fn peer_close_request() {
        let (mut task, queue) = task(Concurrency::SingleInFlight, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"1 bye\n2 after\n", &mut collect(&mut jobs));
        assert!(task.close_requested());
        jobs.remove(0).completer.respond("ok".into());
        drain(&mut task, &queue, &mut jobs);
        assert!(jobs.is_empty());
        assert_eq!(flush(&mut task, &mut jobs).1, WriteStatus::Close);
    }

    #[test]
    fn close_waits_for_pending_handles() {
        let (mut task, queue) = task(Concurrency::Multiplexed, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"1 a\n2 b\n3 partial", &mut collect(&mut jobs));
        task.close();
        assert!(!task.is_finished());
        assert_eq!(task.buffered_bytes(), 0);

        for job in jobs.drain(..) {
            job.completer.respond("late".into());
        }
        drain(&mut task, &queue, &mut jobs);
        assert!(task.is_finished());
        assert_eq!(task.queued_bytes(), 0);
    }

    #[test]
    fn idle_deadline_only_when_idle() {
        let config = Config {
            keep_alive_timeout: Some(Duration::from_secs(5)),
            ..Config::default()
        };
        let (mut task, _queue) = task(Concurrency::SingleInFlight, &config);
        assert!(task.idle_deadline().is_some());
        let mut jobs = Jobs::new();
        task.on_readable(b"1 a\n", &mut collect(&mut jobs));
        assert!(task.idle_deadline().is_none());
    }

    #[test]
    fn execution_failure_is_an_error_reply() {
        let (mut task, queue) = task(Concurrency::SingleInFlight, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"1 a\n", &mut collect(&mut jobs));
        jobs.remove(0).completer.fail(SimpleError::new(
            ResponseCode::NotFound,
            error_num::HTTP_NOT_FOUND,
            "no such document",
        ));
        drain(&mut task, &queue, &mut jobs);
        assert_eq!(flush(&mut task, &mut jobs).0, "0 ERR 404\n");
    }

    #[test]
    fn parts_rejected_without_protocol_support() {
        let (mut task, queue) = task(Concurrency::SingleInFlight, &Config::default());
        let mut jobs = Jobs::new();
        task.on_readable(b"1 a\n", &mut collect(&mut jobs));
        let job = jobs.remove(0);
        job.completer.chunk("part".into());

        let part = queue.try_recv().unwrap();
        let err = task.apply_completion(part, &mut collect(&mut jobs)).unwrap_err();
        assert_eq!(err, LifecycleError::PartialUnsupported(job.completer.handle()));
        assert_eq!(task.queued_bytes(), 0);
        assert_eq!(task.pending_count(), 1);

        job.completer.respond("whole".into());
        drain(&mut task, &queue, &mut jobs);
        assert_eq!(flush(&mut task, &mut jobs).0, "0 whole\n");
    }

    #[test]
    fn empty_reply_still_reports_statistics() {
        let records: Arc<std::sync::Mutex<Vec<RequestStatistics>>> = Arc::default();
        let (mut task, queue) = task(Concurrency::SingleInFlight, &Config::default());
        let sink = Arc::clone(&records);
        task.set_statistics_sink(Arc::new(move |stats: RequestStatistics| {
            sink.lock().unwrap().push(stats);
        }));
        let mut jobs = Jobs::new();
        task.on_readable(b"1 a\n2 b\n", &mut collect(&mut jobs));
        jobs.remove(0).completer.respond(String::new());
        drain(&mut task, &queue, &mut jobs);

        assert_eq!(task.queued_bytes(), 0);
        {
            let records = records.lock().unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].bytes_sent, 0);
            assert_eq!(records[0].protocol_version, "LINES/1");
            assert!(records[0].write_end.is_some());
        }
        // The next request is admitted as usual.
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].request.1, "b");
        assert_eq!(task.protocol_version(), "LINES/1");
    }
}
