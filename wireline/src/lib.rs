//! wireline: per-connection request/response engine.
//!
//! wireline sits between a non-blocking byte stream and a query execution
//! layer. A [`CommTask`] accumulates bytes, lets a [`ProtocolAdapter`] find
//! request boundaries, hands each request to an [`Executor`] without
//! blocking, and writes the replies back in the order the protocol demands:
//! strictly serial for single-in-flight protocols, per-correlation-id for
//! multiplexed ones.
//!
//! Execution finishes on arbitrary threads. Results travel back over a
//! channel ([`Completer`] → [`CompletionQueue`]) and are applied on the
//! thread that owns the connection, so no connection state is ever shared.
//!
//! # Quick Start
//!
//! ```
//! use wireline::protocol::text::TextAdapter;
//! use wireline::{CommLoop, Config, ConnectionInfo, Job, SubmitError, WriteStatus};
//! use protocol_text::{Request, Response};
//!
//! // An executor that answers inline; real executors hand the job to a pool.
//! let executor = |job: Job<Request, Response>| -> Result<(), SubmitError> {
//!     job.completer.respond(Response::ok(job.request.target().to_string()));
//!     Ok(())
//! };
//!
//! let mut event_loop = CommLoop::new(Config::default(), executor).unwrap();
//! let conn = event_loop
//!     .register(ConnectionInfo::new("127.0.0.1:4000".parse().unwrap()), TextAdapter::new())
//!     .unwrap();
//!
//! event_loop.on_readable(conn, b"GET /_api/version HTTP/1.1\r\n\r\n").unwrap();
//! event_loop.process_completions();
//!
//! let mut out = Vec::new();
//! assert_eq!(event_loop.on_writable(conn, &mut out).unwrap(), WriteStatus::Idle);
//! assert!(out.ends_with(b"/_api/version"));
//! ```

pub(crate) mod accumulator;
pub(crate) mod metrics;

pub mod completion;
pub mod config;
pub mod connection;
pub mod error;
pub mod event_loop;
pub mod executor;
pub mod handles;
pub mod protocol;
pub mod stats;
pub mod task;
pub mod write_queue;

pub use completion::{Completer, Completion, CompletionQueue, CompletionSender, Notify};
pub use config::{Config, ConfigBuilder};
pub use connection::{ConnToken, ConnectionInfo};
pub use error::{Error, LifecycleError, SubmitError};
pub use event_loop::CommLoop;
pub use executor::{ChannelExecutor, Executor, Job};
pub use handles::{HandleId, HandleState, HandleTable, RequestHandle};
pub use protocol::{
    Concurrency, CorrelationId, Framed, InvalidFrame, ProtocolAdapter, Reply, ResponseCode,
    SimpleError,
};
pub use stats::{RequestStatistics, StatisticsSink};
pub use task::{CommTask, WriteStatus};
pub use write_queue::{Drain, Flushed, WriteQueue};
