//! Correlation of responses with outstanding requests.
//!
//! Every request gets a 16-bit correlation id from a per-connection
//! [`CorrelationCounter`] and a [`ResponseWaiter`] that settles exactly once:
//!
//! ```text
//! UNUSED ──allocate──► REGISTERED ──dispatch──► COMPLETED ─┐
//!                          │ ──deadline──► TIMED_OUT ──────┤
//!                          │ ──waiter dropped──► ABANDONED ┼──► UNUSED
//!                          └ ──fail_all──► CLOSED ─────────┘
//! ```
//!
//! Timeout and dispatch race on removing the entry under the table lock;
//! whichever removes it settles the request. Each entry also carries a
//! table-unique ticket, so a stale waiter never removes a newer request that
//! reuses its id after the counter wraps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{CorrwireError, Result};

/// Default time a request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(1000);

/// Number of distinct correlation ids.
pub const CORRELATION_ID_SPACE: usize = 1 << 16;

/// Connection-scoped id source. Wraps 65535 → 0.
#[derive(Debug, Clone, Default)]
pub struct CorrelationCounter {
    next: u16,
}

impl CorrelationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter whose first id is `first`.
    pub fn starting_at(first: u16) -> Self {
        Self { next: first }
    }

    /// The id the next call to [`CorrelationCounter::next_id`] returns.
    pub fn peek(&self) -> u16 {
        self.next
    }

    pub fn next_id(&mut self) -> u16 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}

/// An in-flight request.
struct PendingRequest {
    ticket: u64,
    responder: oneshot::Sender<Result<Bytes>>,
}

#[derive(Default)]
struct TableState {
    pending: HashMap<u16, PendingRequest>,
    counter: CorrelationCounter,
    next_ticket: u64,
}

/// In-flight requests of one connection, keyed by correlation id.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    state: Arc<Mutex<TableState>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table whose counter starts at `counter`.
    pub fn with_counter(counter: CorrelationCounter) -> Self {
        Self {
            state: Arc::new(Mutex::new(TableState {
                counter,
                ..TableState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a request under a caller-chosen id.
    ///
    /// Fails with `CorrelationInUse` if the id is already in flight.
    pub fn register(&self, correlation_id: u16, timeout: Duration) -> Result<ResponseWaiter> {
        let mut state = self.lock();
        if state.pending.contains_key(&correlation_id) {
            return Err(CorrwireError::CorrelationInUse(correlation_id));
        }
        Ok(self.insert(&mut state, correlation_id, timeout))
    }

    /// Take the next free id from the counter and register a request under it.
    ///
    /// Ids still in flight are skipped.
    pub fn allocate(&self, timeout: Duration) -> Result<ResponseWaiter> {
        let mut state = self.lock();
        if state.pending.len() >= CORRELATION_ID_SPACE {
            return Err(CorrwireError::TooManyInFlight);
        }

        let correlation_id = loop {
            let id = state.counter.next_id();
            if !state.pending.contains_key(&id) {
                break id;
            }
            tracing::debug!("Correlation id {} still in flight, skipping", id);
        };

        Ok(self.insert(&mut state, correlation_id, timeout))
    }

    fn insert(&self, state: &mut TableState, correlation_id: u16, timeout: Duration) -> ResponseWaiter {
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let (tx, rx) = oneshot::channel();
        state.pending.insert(
            correlation_id,
            PendingRequest {
                ticket,
                responder: tx,
            },
        );

        ResponseWaiter {
            table: self.clone(),
            correlation_id,
            ticket,
            timeout,
            deadline: Instant::now() + timeout,
            rx,
            settled: false,
        }
    }

    /// Deliver a response payload to the request waiting on `correlation_id`.
    ///
    /// Returns `false` and discards the payload if nothing is waiting (timed
    /// out, abandoned, or never sent).
    pub fn dispatch(&self, correlation_id: u16, payload: Bytes) -> bool {
        let mut state = self.lock();
        match state.pending.remove(&correlation_id) {
            Some(request) => {
                // Sent under the lock so a waiter that loses the removal race
                // always finds the payload in its channel.
                let _ = request.responder.send(Ok(payload));
                true
            }
            None => {
                tracing::debug!(
                    "{}; discarding {} byte response",
                    CorrwireError::UnknownCorrelation(correlation_id),
                    payload.len()
                );
                false
            }
        }
    }

    /// Fail every in-flight request with `ConnectionClosed`.
    ///
    /// Returns the number of requests failed.
    pub fn fail_all(&self) -> usize {
        let mut state = self.lock();
        let count = state.pending.len();
        for (_, request) in state.pending.drain() {
            let _ = request.responder.send(Err(CorrwireError::ConnectionClosed));
        }
        count
    }

    /// Remove the entry for `correlation_id` only if it still holds `ticket`.
    fn remove_if(&self, correlation_id: u16, ticket: u64) -> bool {
        let mut state = self.lock();
        match state.pending.get(&correlation_id) {
            Some(request) if request.ticket == ticket => {
                state.pending.remove(&correlation_id);
                true
            }
            _ => false,
        }
    }

    /// Number of requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn contains(&self, correlation_id: u16) -> bool {
        self.lock().pending.contains_key(&correlation_id)
    }

    /// The id the counter hands out next, ignoring in-flight skips.
    pub fn next_correlation_id(&self) -> u16 {
        self.lock().counter.peek()
    }
}

/// One-shot completion handle for a registered request.
///
/// Dropping an unsettled waiter removes its table entry.
pub struct ResponseWaiter {
    table: CorrelationTable,
    correlation_id: u16,
    ticket: u64,
    timeout: Duration,
    deadline: Instant,
    rx: oneshot::Receiver<Result<Bytes>>,
    settled: bool,
}

impl ResponseWaiter {
    pub fn correlation_id(&self) -> u16 {
        self.correlation_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the response payload, failing with `Timeout` at the deadline.
    pub async fn wait(mut self) -> Result<Bytes> {
        let outcome = tokio::time::timeout_at(self.deadline, &mut self.rx).await;
        self.settled = true;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CorrwireError::ConnectionClosed),
            Err(_) => {
                if self.table.remove_if(self.correlation_id, self.ticket) {
                    tracing::debug!(
                        "Request {} timed out after {:?}",
                        self.correlation_id,
                        self.timeout
                    );
                    return Err(CorrwireError::Timeout {
                        correlation_id: self.correlation_id,
                        after: self.timeout,
                    });
                }
                // Dispatch removed the entry first; its payload is already here.
                match self.rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(CorrwireError::ConnectionClosed),
                }
            }
        }
    }
}

impl Drop for ResponseWaiter {
    fn drop(&mut self) {
        if !self.settled && self.table.remove_if(self.correlation_id, self.ticket) {
            tracing::debug!("Request {} abandoned", self.correlation_id);
        }
    }
}
