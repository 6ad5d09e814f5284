//! Cross-thread hand-off of execution results to the owning loop thread.
//!
//! Executors may finish on any thread. They never touch connection state;
//! they send a [`Completion`] over a channel and optionally wake the loop
//! through [`Notify`]. The loop thread applies completions in arrival order.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::connection::ConnToken;
use crate::handles::HandleId;
use crate::protocol::SimpleError;

/// Wakes the thread that owns the completion queue.
pub trait Notify: Send + Sync {
    fn notify(&self);
}

/// The result of executing one request, addressed to its connection and handle.
#[derive(Debug)]
pub struct Completion<Resp> {
    pub token: ConnToken,
    pub handle: HandleId,
    pub outcome: Result<Resp, SimpleError>,
    /// One part of a streamed response; the handle stays pending.
    pub partial: bool,
}

/// Sending half of a completion queue. Cheap to clone; `Send + Sync`.
pub struct CompletionSender<Resp> {
    tx: Sender<Completion<Resp>>,
    notify: Option<Arc<dyn Notify>>,
}

impl<Resp> Clone for CompletionSender<Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            notify: self.notify.clone(),
        }
    }
}

impl<Resp> fmt::Debug for CompletionSender<Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSender")
            .field("notify", &self.notify.is_some())
            .finish()
    }
}

impl<Resp> CompletionSender<Resp> {
    /// Queue a completion. Returns `false` if the owning loop is gone.
    pub fn complete(
        &self,
        token: ConnToken,
        handle: HandleId,
        outcome: Result<Resp, SimpleError>,
    ) -> bool {
        self.send(Completion {
            token,
            handle,
            outcome,
            partial: false,
        })
    }

    /// Queue one part of a streamed response.
    pub fn send_part(&self, token: ConnToken, handle: HandleId, part: Resp) -> bool {
        self.send(Completion {
            token,
            handle,
            outcome: Ok(part),
            partial: true,
        })
    }

    fn send(&self, completion: Completion<Resp>) -> bool {
        let sent = self.tx.send(completion).is_ok();
        if sent && let Some(notify) = &self.notify {
            notify.notify();
        }
        sent
    }

    /// Bind this sender to one request.
    pub fn completer(&self, token: ConnToken, handle: HandleId) -> Completer<Resp> {
        Completer {
            sender: self.clone(),
            token,
            handle,
        }
    }
}

/// Reports the outcome of one dispatched request.
///
/// Handed to the executor with each [`Job`](crate::Job). Calling it more than
/// once is reported by the connection as a lifecycle violation and otherwise
/// ignored.
pub struct Completer<Resp> {
    sender: CompletionSender<Resp>,
    token: ConnToken,
    handle: HandleId,
}

impl<Resp> Clone for Completer<Resp> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            token: self.token,
            handle: self.handle,
        }
    }
}

impl<Resp> fmt::Debug for Completer<Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("token", &self.token)
            .field("handle", &self.handle)
            .finish()
    }
}

impl<Resp> Completer<Resp> {
    pub fn token(&self) -> ConnToken {
        self.token
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn complete(&self, outcome: Result<Resp, SimpleError>) -> bool {
        self.sender.complete(self.token, self.handle, outcome)
    }

    pub fn respond(&self, response: Resp) -> bool {
        self.complete(Ok(response))
    }

    pub fn fail(&self, error: SimpleError) -> bool {
        self.complete(Err(error))
    }

    /// Send one part of a streamed response.
    ///
    /// Parts are written under the request's correlation id in the order
    /// they are sent, and the request stays pending until it is completed.
    /// Only protocols that frame partial responses accept parts.
    pub fn chunk(&self, part: Resp) -> bool {
        self.sender.send_part(self.token, self.handle, part)
    }
}

/// Receiving half, owned by the loop thread.
pub struct CompletionQueue<Resp> {
    rx: Receiver<Completion<Resp>>,
    sender: CompletionSender<Resp>,
}

impl<Resp> Default for CompletionQueue<Resp> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<Resp> CompletionQueue<Resp> {
    pub fn new(notify: Option<Arc<dyn Notify>>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            rx,
            sender: CompletionSender { tx, notify },
        }
    }

    pub fn sender(&self) -> CompletionSender<Resp> {
        self.sender.clone()
    }

    pub fn try_recv(&self) -> Option<Completion<Resp>> {
        self.rx.try_recv().ok()
    }

    /// Block until a completion arrives or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Completion<Resp>> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
