use std::io;

use thiserror::Error;

use crate::handles::HandleId;

/// Errors returned by the wireline engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Writing to the peer failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    Config(String),
    /// No free connection slots available.
    #[error("connection limit reached")]
    ConnectionLimitReached,
    /// Invalid connection token (stale or out of range).
    #[error("invalid connection")]
    InvalidConnection,
}

/// A completion that does not match a pending request handle.
///
/// Reported for diagnostics only; the write queue is never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The handle existed and has already been completed.
    #[error("request handle {0} completed more than once")]
    DoubleCompletion(HandleId),
    /// The handle was never issued by this connection.
    #[error("unknown request handle {0}")]
    UnknownHandle(HandleId),
    /// A partial response was sent over a protocol that cannot frame one.
    #[error("protocol does not support partial responses (handle {0})")]
    PartialUnsupported(HandleId),
}

/// The execution layer refused a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The execution queue is full. The request is answered with 503.
    #[error("execution queue full")]
    QueueFull,
    /// The execution layer has shut down.
    #[error("executor shut down")]
    Shutdown,
}
