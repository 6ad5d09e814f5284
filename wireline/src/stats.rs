//! Per-request accounting records and the hook that receives them.

use std::time::{Duration, Instant};

use crate::protocol::CorrelationId;

/// Timing and size accounting for one request/response exchange.
///
/// Timestamps are filled in as the exchange progresses; a record handed to a
/// [`StatisticsSink`] has its response fully written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestStatistics {
    pub protocol: &'static str,
    /// Protocol revision the request was received with, e.g. `HTTP/1.0`.
    pub protocol_version: &'static str,
    pub correlation: CorrelationId,
    /// First byte of the request was buffered.
    pub read_start: Option<Instant>,
    /// The request was fully framed.
    pub read_end: Option<Instant>,
    /// The request was handed to the executor.
    pub dispatched: Option<Instant>,
    /// The reply was encoded and queued.
    pub completed: Option<Instant>,
    pub write_start: Option<Instant>,
    pub write_end: Option<Instant>,
    pub bytes_received: usize,
    pub bytes_sent: usize,
    /// The reply was an error response.
    pub error: bool,
}

impl RequestStatistics {
    pub fn new(protocol: &'static str) -> Self {
        Self {
            protocol,
            ..Default::default()
        }
    }

    /// Time from the first request byte to the last response byte.
    pub fn total_duration(&self) -> Option<Duration> {
        Some(self.write_end?.saturating_duration_since(self.read_start?))
    }

    /// Time spent in the executor.
    pub fn execution_duration(&self) -> Option<Duration> {
        Some(self.completed?.saturating_duration_since(self.dispatched?))
    }

    /// Time the encoded response waited in the write queue and on the socket.
    pub fn write_duration(&self) -> Option<Duration> {
        Some(self.write_end?.saturating_duration_since(self.completed?))
    }
}

/// Receives the statistics of every fully written response.
///
/// Shared by all connections of a loop, so implementations take `&self`.
pub trait StatisticsSink: Send + Sync {
    fn record(&self, stats: RequestStatistics);
}

impl<F> StatisticsSink for F
where
    F: Fn(RequestStatistics) + Send + Sync,
{
    fn record(&self, stats: RequestStatistics) {
        self(stats)
    }
}
