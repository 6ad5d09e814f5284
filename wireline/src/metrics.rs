//! wireline engine metrics.
//!
//! Process-wide counters for connections, requests, bytes and lifecycle
//! violations, registered with `metriken` so any exposition layer that walks
//! the registry picks them up.

use metriken::{Counter, Gauge, metric};

// ── Connection lifecycle ─────────────────────────────────────────

#[metric(
    name = "wireline/connections/opened",
    description = "Total connections registered"
)]
pub static CONNECTIONS_OPENED: Counter = Counter::new();

#[metric(
    name = "wireline/connections/closed",
    description = "Total connections released"
)]
pub static CONNECTIONS_CLOSED: Counter = Counter::new();

#[metric(
    name = "wireline/connections/active",
    description = "Currently active connections"
)]
pub static CONNECTIONS_ACTIVE: Gauge = Gauge::new();

#[metric(
    name = "wireline/connections/idle_timeout",
    description = "Connections closed by the keep-alive timeout"
)]
pub static CONNECTIONS_IDLE_TIMEOUT: Counter = Counter::new();

// ── Requests ─────────────────────────────────────────────────────

#[metric(
    name = "wireline/requests/dispatched",
    description = "Requests handed to the executor"
)]
pub static REQUESTS_DISPATCHED: Counter = Counter::new();

#[metric(
    name = "wireline/requests/completed",
    description = "Requests answered with a response"
)]
pub static REQUESTS_COMPLETED: Counter = Counter::new();

#[metric(
    name = "wireline/requests/failed",
    description = "Requests answered with an error"
)]
pub static REQUESTS_FAILED: Counter = Counter::new();

#[metric(
    name = "wireline/requests/parts",
    description = "Partial responses queued for streamed requests"
)]
pub static RESPONSE_PARTS: Counter = Counter::new();

#[metric(
    name = "wireline/requests/rejected",
    description = "Requests refused by the executor"
)]
pub static REQUESTS_REJECTED: Counter = Counter::new();

#[metric(
    name = "wireline/requests/invalid",
    description = "Frames rejected by the protocol adapter"
)]
pub static REQUESTS_INVALID: Counter = Counter::new();

#[metric(
    name = "wireline/requests/in_flight",
    description = "Requests currently pending execution"
)]
pub static REQUESTS_IN_FLIGHT: Gauge = Gauge::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(name = "wireline/bytes/received", description = "Total bytes received")]
pub static BYTES_RECEIVED: Counter = Counter::new();

#[metric(name = "wireline/bytes/sent", description = "Total bytes sent")]
pub static BYTES_SENT: Counter = Counter::new();

// ── Engine health ────────────────────────────────────────────────

#[metric(
    name = "wireline/lifecycle/violations",
    description = "Completions for unknown or already completed handles"
)]
pub static LIFECYCLE_VIOLATIONS: Counter = Counter::new();

#[metric(
    name = "wireline/backpressure/engaged",
    description = "Times a write queue crossed its soft cap"
)]
pub static BACKPRESSURE_ENGAGED: Counter = Counter::new();

#[metric(
    name = "wireline/completions/stale",
    description = "Completions routed to a connection that no longer exists"
)]
pub static COMPLETIONS_STALE: Counter = Counter::new();
