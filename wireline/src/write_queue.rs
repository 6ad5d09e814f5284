//! Ordered queue of encoded responses awaiting transmission.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Instant;

use bytes::Bytes;

use crate::protocol::CorrelationId;
use crate::stats::RequestStatistics;

/// One encoded response and its accounting record.
#[derive(Debug)]
pub struct PendingResponse {
    data: Bytes,
    written: usize,
    stats: Option<RequestStatistics>,
    correlation: CorrelationId,
}

impl PendingResponse {
    fn remaining(&self) -> &[u8] {
        &self.data[self.written..]
    }

    pub fn correlation(&self) -> CorrelationId {
        self.correlation
    }
}

/// A fully written response.
#[derive(Debug)]
pub struct Flushed {
    pub correlation: CorrelationId,
    pub bytes: usize,
    pub stats: Option<RequestStatistics>,
}

/// How a drain attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Every queued byte was written.
    Empty,
    /// The sink would block; bytes remain queued.
    Blocked,
}

/// FIFO of encoded responses. Entries are written strictly in push order;
/// a partial write advances the front entry in place.
#[derive(Debug)]
pub struct WriteQueue {
    entries: VecDeque<PendingResponse>,
    queued_bytes: usize,
    soft_cap: usize,
}

impl WriteQueue {
    pub fn new(soft_cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            queued_bytes: 0,
            soft_cap,
        }
    }

    /// Queue an encoded response.
    ///
    /// Empty data has nothing to write, so it is not queued; it is returned
    /// as already flushed so its accounting record is not lost.
    #[must_use]
    pub fn push(
        &mut self,
        data: Bytes,
        mut stats: Option<RequestStatistics>,
        correlation: CorrelationId,
    ) -> Option<Flushed> {
        if data.is_empty() {
            if let Some(stats) = stats.as_mut() {
                let now = Instant::now();
                stats.write_start = Some(now);
                stats.write_end = Some(now);
                stats.bytes_sent = 0;
            }
            return Some(Flushed {
                correlation,
                bytes: 0,
                stats,
            });
        }
        self.queued_bytes += data.len();
        self.entries.push_back(PendingResponse {
            data,
            written: 0,
            stats,
            correlation,
        });
        None
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Bytes queued and not yet written.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn is_over_cap(&self) -> bool {
        self.queued_bytes > self.soft_cap
    }

    /// Correlation ids of the queued entries, front first.
    pub fn correlations(&self) -> impl Iterator<Item = CorrelationId> + '_ {
        self.entries.iter().map(PendingResponse::correlation)
    }

    /// Write queued bytes to `sink` until it would block or the queue is
    /// empty. `on_flushed` is called once per fully written entry, in order.
    pub fn drain_to<W, F>(&mut self, sink: &mut W, mut on_flushed: F) -> io::Result<Drain>
    where
        W: Write + ?Sized,
        F: FnMut(Flushed),
    {
        while let Some(front) = self.entries.front_mut() {
            if front.written == 0
                && let Some(stats) = front.stats.as_mut()
                && stats.write_start.is_none()
            {
                stats.write_start = Some(Instant::now());
            }
            let n = match sink.write(front.remaining()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Drain::Blocked),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            front.written += n;
            self.queued_bytes -= n;
            if front.written < front.data.len() {
                continue;
            }
            if let Some(mut done) = self.entries.pop_front() {
                if let Some(stats) = done.stats.as_mut() {
                    stats.write_end = Some(Instant::now());
                    stats.bytes_sent = done.data.len();
                }
                on_flushed(Flushed {
                    correlation: done.correlation,
                    bytes: done.data.len(),
                    stats: done.stats,
                });
            }
        }
        Ok(Drain::Empty)
    }

    /// Drop every queued entry. Returns the number of unsent bytes.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queued_bytes;
        self.entries.clear();
        self.queued_bytes = 0;
        dropped
    }
}
