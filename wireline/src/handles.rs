//! Request handle lifecycle: register on dispatch, complete exactly once.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::error::LifecycleError;
use crate::protocol::{CorrelationId, SimpleError};
use crate::stats::RequestStatistics;

/// Connection-local id the executor reports completion with.
///
/// Ids are issued in increasing order and never reused on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(raw: u64) -> Self {
        HandleId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Completed,
    Failed,
}

/// Tracks one dispatched request until its reply is queued.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    pub id: HandleId,
    pub correlation: CorrelationId,
    pub state: HandleState,
    pub stats: RequestStatistics,
}

/// A request (or error) waiting for an earlier request with the same
/// correlation id to complete.
#[derive(Debug)]
pub(crate) enum Parked<Req> {
    Request {
        request: Req,
        stats: RequestStatistics,
    },
    Error {
        error: SimpleError,
        stats: RequestStatistics,
    },
}

/// Pending request handles of one connection.
#[derive(Debug)]
pub struct HandleTable<Req> {
    pending: HashMap<HandleId, RequestHandle>,
    next_id: u64,
    limit: usize,
    parked: HashMap<CorrelationId, VecDeque<Parked<Req>>>,
    parked_count: usize,
}

impl<Req> HandleTable<Req> {
    /// `limit` bounds pending plus parked entries.
    pub fn new(limit: usize) -> Self {
        Self {
            pending: HashMap::new(),
            next_id: 0,
            limit,
            parked: HashMap::new(),
            parked_count: 0,
        }
    }

    /// Register a new pending handle.
    pub fn register(&mut self, correlation: CorrelationId, stats: RequestStatistics) -> HandleId {
        let id = HandleId(self.next_id);
        self.next_id += 1;
        self.pending.insert(
            id,
            RequestHandle {
                id,
                correlation,
                state: HandleState::Pending,
                stats,
            },
        );
        id
    }

    /// Move a pending handle to its terminal state and remove it.
    pub fn complete(&mut self, id: HandleId, failed: bool) -> Result<RequestHandle, LifecycleError> {
        match self.pending.remove(&id) {
            Some(mut handle) => {
                handle.state = if failed {
                    HandleState::Failed
                } else {
                    HandleState::Completed
                };
                Ok(handle)
            }
            None => Err(self.missing(id)),
        }
    }

    /// The pending handle `id`, or the violation a completion for it would be.
    pub fn pending(&self, id: HandleId) -> Result<&RequestHandle, LifecycleError> {
        self.pending.get(&id).ok_or_else(|| self.missing(id))
    }

    fn missing(&self, id: HandleId) -> LifecycleError {
        if id.0 < self.next_id {
            LifecycleError::DoubleCompletion(id)
        } else {
            LifecycleError::UnknownHandle(id)
        }
    }

    pub fn get(&self, id: HandleId) -> Option<&RequestHandle> {
        self.pending.get(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn parked_count(&self) -> usize {
        self.parked_count
    }

    /// Whether another request may be admitted.
    pub fn has_capacity(&self) -> bool {
        self.pending.len() + self.parked_count < self.limit
    }

    /// Nothing pending and nothing parked.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.parked_count == 0
    }

    pub fn is_correlation_pending(&self, correlation: CorrelationId) -> bool {
        self.pending.values().any(|h| h.correlation == correlation)
    }

    pub(crate) fn park(&mut self, correlation: CorrelationId, entry: Parked<Req>) {
        self.parked.entry(correlation).or_default().push_back(entry);
        self.parked_count += 1;
    }

    pub(crate) fn unpark(&mut self, correlation: CorrelationId) -> Option<Parked<Req>> {
        let queue = self.parked.get_mut(&correlation)?;
        let entry = queue.pop_front();
        if queue.is_empty() {
            self.parked.remove(&correlation);
        }
        if entry.is_some() {
            self.parked_count -= 1;
        }
        entry
    }

    /// Drop parked entries. Pending handles stay tracked.
    pub(crate) fn clear_parked(&mut self) -> usize {
        let dropped = self.parked_count;
        self.parked.clear();
        self.parked_count = 0;
        dropped
    }
}
