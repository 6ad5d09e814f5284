//! The seam between connection tasks and the query execution layer.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::completion::Completer;
use crate::connection::ConnectionInfo;
use crate::error::SubmitError;

/// One parsed request handed off for execution.
#[derive(Debug)]
pub struct Job<Req, Resp> {
    pub request: Req,
    pub completer: Completer<Resp>,
    pub info: Arc<ConnectionInfo>,
}

/// Accepts jobs without blocking the calling (I/O) thread.
///
/// Execution may finish on any thread; the result goes back through
/// [`Job::completer`]. A refused job is answered with a 503 by the caller.
pub trait Executor<Req, Resp> {
    fn submit(&mut self, job: Job<Req, Resp>) -> Result<(), SubmitError>;
}

impl<Req, Resp, F> Executor<Req, Resp> for F
where
    F: FnMut(Job<Req, Resp>) -> Result<(), SubmitError>,
{
    fn submit(&mut self, job: Job<Req, Resp>) -> Result<(), SubmitError> {
        self(job)
    }
}

/// Executor that forwards jobs to worker threads over a bounded channel.
///
/// A full channel refuses the job with [`SubmitError::QueueFull`]; a channel
/// with no receivers left refuses with [`SubmitError::Shutdown`].
pub struct ChannelExecutor<Req, Resp> {
    tx: Sender<Job<Req, Resp>>,
}

impl<Req, Resp> Clone for ChannelExecutor<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<Req, Resp> ChannelExecutor<Req, Resp> {
    /// Create an executor and the receiver workers pull jobs from.
    pub fn bounded(capacity: usize) -> (Self, Receiver<Job<Req, Resp>>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl<Req, Resp> Executor<Req, Resp> for ChannelExecutor<Req, Resp> {
    fn submit(&mut self, job: Job<Req, Resp>) -> Result<(), SubmitError> {
        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::QueueFull,
            TrySendError::Disconnected(_) => SubmitError::Shutdown,
        })
    }
}
