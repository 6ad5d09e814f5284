#![allow(dead_code)]

use std::io::{self, Write};

use bytes::BytesMut;
use wireline::{
    Concurrency, CorrelationId, Framed, InvalidFrame, Job, ProtocolAdapter, Reply, SimpleError,
    SubmitError,
};

/// Longest line accepted before the stream is considered corrupt.
pub const MAX_LINE: usize = 1024;

/// A parsed `REQ id=<n> <body>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    pub id: u64,
    pub body: String,
}

/// Newline-framed test protocol.
///
/// Requests are `REQ id=<n> <body>\n`; replies are `RES id=<n> <body>\n` or
/// `ERR id=<n> <code>\n`, preceded by any `PART id=<n> <body>\n` lines of a
/// streamed reply. Any other complete line is a recoverable error.
pub struct ReqLine {
    pub concurrency: Concurrency,
}

impl ReqLine {
    pub fn single() -> Self {
        ReqLine {
            concurrency: Concurrency::SingleInFlight,
        }
    }

    pub fn multiplexed() -> Self {
        ReqLine {
            concurrency: Concurrency::Multiplexed,
        }
    }
}

fn parse_line(line: &str) -> Option<LineRequest> {
    let rest = line.strip_prefix("REQ id=")?;
    let (id, body) = rest.split_once(' ').unwrap_or((rest, ""));
    Some(LineRequest {
        id: id.parse().ok()?,
        body: body.to_string(),
    })
}

impl ProtocolAdapter for ReqLine {
    type Request = LineRequest;
    type Response = String;

    fn protocol(&self) -> &'static str {
        "reqline"
    }

    fn protocol_version(&self) -> &'static str {
        "REQ/1"
    }

    fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    fn frame(&mut self, data: &[u8]) -> Framed<LineRequest> {
        let Some(end) = data.iter().position(|&b| b == b'\n') else {
            if data.len() > MAX_LINE {
                return Framed::Invalid(InvalidFrame::fatal(
                    SimpleError::bad_request("line too long"),
                    0,
                ));
            }
            return Framed::Incomplete;
        };
        let line = String::from_utf8_lossy(&data[..end]);
        match parse_line(&line) {
            Some(request) => Framed::Complete {
                request,
                consumed: end + 1,
            },
            None => Framed::Invalid(InvalidFrame::recoverable(
                SimpleError::bad_request("not a request"),
                0,
                end + 1,
            )),
        }
    }

    fn encode(&mut self, reply: &Reply<String>, correlation: CorrelationId, out: &mut BytesMut) {
        let line = match reply {
            Reply::Response(body) => format!("RES id={correlation} {body}\n"),
            Reply::Partial(body) => format!("PART id={correlation} {body}\n"),
            Reply::Error(err) => format!("ERR id={correlation} {}\n", err.code),
        };
        out.extend_from_slice(line.as_bytes());
    }

    fn correlation_id(&self, request: &LineRequest) -> CorrelationId {
        match self.concurrency {
            Concurrency::SingleInFlight => 0,
            Concurrency::Multiplexed => request.id,
        }
    }

    fn supports_partial(&self) -> bool {
        true
    }

    fn wants_close(&self, request: &LineRequest) -> bool {
        request.body == "quit"
    }
}

pub type LineJob = Job<LineRequest, String>;

/// Executor that keeps every job for the test to complete by hand.
pub fn collect(jobs: &mut Vec<LineJob>) -> impl FnMut(LineJob) -> Result<(), SubmitError> + '_ {
    move |job| {
        jobs.push(job);
        Ok(())
    }
}

/// Sink that accepts `budget` bytes, at most `chunk` per write call.
pub struct ThrottledSink {
    pub out: Vec<u8>,
    pub budget: usize,
    pub chunk: usize,
}

impl ThrottledSink {
    pub fn new(budget: usize, chunk: usize) -> Self {
        ThrottledSink {
            out: Vec::new(),
            budget,
            chunk,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }
}

impl Write for ThrottledSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.chunk).min(self.budget);
        self.out.extend_from_slice(&buf[..n]);
        self.budget -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn peer() -> std::net::SocketAddr {
    "192.0.2.10:40000".parse().unwrap()
}
