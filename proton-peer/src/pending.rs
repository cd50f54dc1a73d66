// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pending Operations
//!
//! A [`PendingOperation`] is one outstanding request. It is completed
//! exactly once, by whichever of the receive path, the timeout path or a
//! channel failure gets there first; the losers are no-ops.
//!
//! Duplex channels multiplex many requests, so they keep a
//! [`PendingTable`] keyed by request id. Exchange calls need no table: the
//! call itself is the correlation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::NetworkError;
use crate::protocol::{OperationRequest, OperationResponse, SendOptions};
use crate::statistics::StatisticsSnapshot;

/// Which path completed an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSource {
    /// A response frame from the server (any return code).
    Response,
    /// The deadline passed first.
    Timeout,
    /// The transport failed to carry the request or its response.
    TransportFailure,
    /// The request could not be encoded, so it never left.
    EncodeFailure,
    /// A response arrived but could not be decoded.
    DecodeFailure,
    /// The channel closed with the operation still outstanding.
    ChannelClosed,
}

/// Longest timeout an operation can carry; larger values are clamped.
pub const MAX_OPERATION_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Final result of a [`PendingOperation`].
#[derive(Debug, Clone)]
pub struct Completion {
    pub response: OperationResponse,
    pub options: SendOptions,
    pub source: CompletionSource,
    pub elapsed: Duration,
}

impl Completion {
    /// True only for a server response carrying `ReturnCode::OK`.
    pub fn is_ok(&self) -> bool {
        self.source == CompletionSource::Response && self.response.is_ok()
    }
}

/// One in-flight request.
pub struct PendingOperation {
    request: OperationRequest,
    options: SendOptions,
    timeout: Duration,
    created_at: Instant,
    deadline: Instant,
    slot: Mutex<Option<Completion>>,
    condvar: Condvar,
    notify: Notify,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
}

impl std::fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperation")
            .field("request_id", &self.request.request_id)
            .field("operation_code", &self.request.operation_code)
            .field("timeout", &self.timeout)
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl PendingOperation {
    /// Starts the deadline clock for `request`, which already carries its id.
    ///
    /// `timeout` is clamped to [`MAX_OPERATION_TIMEOUT`].
    pub fn new(request: OperationRequest, options: SendOptions, timeout: Duration) -> Self {
        let created_at = Instant::now();
        let timeout = timeout.min(MAX_OPERATION_TIMEOUT);
        let deadline = created_at
            .checked_add(timeout)
            .unwrap_or(created_at + MAX_OPERATION_TIMEOUT);
        PendingOperation {
            request,
            options,
            timeout,
            created_at,
            deadline,
            slot: Mutex::new(None),
            condvar: Condvar::new(),
            notify: Notify::new(),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
        }
    }

    pub fn request(&self) -> &OperationRequest {
        &self.request
    }

    pub fn request_id(&self) -> u32 {
        self.request.request_id
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn is_completed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// The completion, if there is one yet.
    pub fn completion(&self) -> Option<Completion> {
        self.slot.lock().clone()
    }

    /// Bytes moved on behalf of this operation.
    pub fn statistics_delta(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
        }
    }

    pub fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Completes the operation. Returns false if it was already completed.
    pub fn complete(
        &self,
        response: OperationResponse,
        options: SendOptions,
        source: CompletionSource,
    ) -> bool {
        {
            let mut slot = self.slot.lock();
            if slot.is_some() {
                debug!(
                    request_id = self.request.request_id,
                    ?source,
                    "late completion discarded"
                );
                return false;
            }
            *slot = Some(Completion {
                response,
                options,
                source,
                elapsed: self.created_at.elapsed(),
            });
        }
        self.condvar.notify_all();
        self.notify.notify_waiters();
        true
    }

    /// Completes with a synthesized `OPERATION_INVALID` response.
    pub fn fail(&self, source: CompletionSource, message: impl Into<String>) -> bool {
        let response = OperationResponse::invalid(&self.request, message);
        self.complete(response, self.options, source)
    }

    /// Completes with the timeout response.
    pub fn time_out(&self) -> bool {
        let completed = self.fail(
            CompletionSource::Timeout,
            format!("operation timed out after {}ms", self.timeout.as_millis()),
        );
        if completed {
            warn!(
                request_id = self.request.request_id,
                operation_code = %self.request.operation_code,
                "operation timed out"
            );
        }
        completed
    }

    /// Suspends until completion or the deadline, whichever comes first.
    ///
    /// Always resolves: if the deadline passes, the operation is completed
    /// with the timeout response and that is returned.
    pub async fn wait(&self) -> Completion {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(done) = self.completion() {
                return done;
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.time_out();
                continue;
            }

            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    /// Thread-blocking variant of [`PendingOperation::wait`].
    pub fn wait_blocking(&self) -> Completion {
        loop {
            {
                let mut slot = self.slot.lock();
                while slot.is_none() {
                    if self
                        .condvar
                        .wait_until(&mut slot, self.deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                if let Some(done) = slot.as_ref() {
                    return done.clone();
                }
            }
            self.time_out();
        }
    }
}

/// Request id -> pending operation map for duplex channels.
#[derive(Debug)]
pub struct PendingTable {
    entries: Mutex<HashMap<u32, Arc<PendingOperation>>>,
    capacity: usize,
}

impl PendingTable {
    pub fn new(capacity: usize) -> Self {
        PendingTable {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, request_id: u32) -> bool {
        self.entries.lock().contains_key(&request_id)
    }

    /// Tracks `operation` until it is completed or pruned.
    pub fn insert(&self, operation: Arc<PendingOperation>) -> Result<(), NetworkError> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            return Err(NetworkError::TooManyPending(self.capacity));
        }
        let id = operation.request_id();
        if entries.contains_key(&id) {
            return Err(NetworkError::SendFailed(format!(
                "request id {} already in flight",
                id
            )));
        }
        entries.insert(id, operation);
        Ok(())
    }

    /// Stops tracking `request_id` without completing it.
    pub fn remove(&self, request_id: u32) -> Option<Arc<PendingOperation>> {
        self.entries.lock().remove(&request_id)
    }

    /// Routes a decoded response to its operation.
    ///
    /// Returns false when no operation is waiting for that id (already
    /// timed out, or never sent by us).
    pub fn complete_response(
        &self,
        response: OperationResponse,
        options: SendOptions,
        received_bytes: usize,
    ) -> bool {
        let Some(operation) = self.remove(response.response_id) else {
            debug!(
                response_id = response.response_id,
                "response for unknown request dropped"
            );
            return false;
        };
        operation.record_received(received_bytes);
        operation.complete(response, options, CompletionSource::Response)
    }

    /// Completes every operation whose deadline is at or before `now` with
    /// the timeout response, and prunes entries completed elsewhere.
    ///
    /// Returns the number of operations timed out by this call.
    pub fn expire(&self, now: Instant) -> usize {
        let expired: Vec<Arc<PendingOperation>> = {
            let mut entries = self.entries.lock();
            let ids: Vec<u32> = entries
                .iter()
                .filter(|(_, op)| op.is_expired(now) || op.is_completed())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id))
                .collect()
        };

        expired.iter().filter(|op| op.time_out()).count()
    }

    /// Completes every tracked operation with a channel-closed failure.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<Arc<PendingOperation>> =
            self.entries.lock().drain().map(|(_, op)| op).collect();

        let failed = drained
            .iter()
            .filter(|op| op.fail(CompletionSource::ChannelClosed, reason))
            .count();
        if failed > 0 {
            warn!(count = failed, reason, "pending operations failed");
        }
        failed
    }

    /// Earliest deadline among tracked operations.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.lock().values().map(|op| op.deadline()).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReturnCode;

    fn op(id: u32, timeout: Duration) -> Arc<PendingOperation> {
        let mut req = OperationRequest::new("5", vec![]);
        req.request_id = id;
        Arc::new(PendingOperation::new(req, SendOptions::new(), timeout))
    }

    #[test]
    fn test_complete_once() {
        let pending = op(1, Duration::from_secs(5));
        let resp = OperationResponse::ok(pending.request(), vec![1]);

        assert!(pending.complete(resp.clone(), SendOptions::new(), CompletionSource::Response));
        assert!(!pending.time_out());
        assert!(!pending.fail(CompletionSource::ChannelClosed, "gone"));

        let done = pending.completion().unwrap();
        assert_eq!(done.source, CompletionSource::Response);
        assert_eq!(done.response, resp);
        assert!(done.is_ok());
    }

    #[test]
    fn test_huge_timeout_is_clamped() {
        let pending = op(1, Duration::from_secs(u64::MAX));
        let now = Instant::now();

        assert!(!pending.is_expired(now));
        assert!(pending.deadline() > now + Duration::from_secs(3600));
        assert!(pending.deadline() <= now + MAX_OPERATION_TIMEOUT);
    }

    #[test]
    fn test_table_capacity() {
        let table = PendingTable::new(1);
        table.insert(op(1, Duration::from_secs(5))).unwrap();
        assert!(matches!(
            table.insert(op(2, Duration::from_secs(5))),
            Err(NetworkError::TooManyPending(1))
        ));
    }

    #[test]
    fn test_table_rejects_duplicate_id() {
        let table = PendingTable::new(4);
        table.insert(op(9, Duration::from_secs(5))).unwrap();
        assert!(table.insert(op(9, Duration::from_secs(5))).is_err());
    }

    #[test]
    fn test_expire_only_past_deadline() {
        let table = PendingTable::new(8);
        let short = op(1, Duration::from_millis(0));
        let long = op(2, Duration::from_secs(60));
        table.insert(short.clone()).unwrap();
        table.insert(long.clone()).unwrap();

        assert_eq!(table.expire(Instant::now()), 1);
        assert!(short.is_completed());
        assert!(!long.is_completed());
        assert!(table.contains(2));
        assert!(!table.contains(1));

        let done = short.completion().unwrap();
        assert_eq!(done.source, CompletionSource::Timeout);
        assert_eq!(done.response.return_code, ReturnCode::OPERATION_INVALID);
    }

    #[test]
    fn test_fail_all_drains() {
        let table = PendingTable::new(8);
        let a = op(1, Duration::from_secs(60));
        let b = op(2, Duration::from_secs(60));
        table.insert(a.clone()).unwrap();
        table.insert(b.clone()).unwrap();

        assert_eq!(table.fail_all("channel closed"), 2);
        assert!(table.is_empty());
        assert_eq!(
            a.completion().unwrap().source,
            CompletionSource::ChannelClosed
        );
        assert_eq!(
            b.completion().unwrap().response.debug_message.as_deref(),
            Some("channel closed")
        );
    }

    #[test]
    fn test_wait_blocking_times_out() {
        let pending = op(3, Duration::from_millis(50));
        let started = Instant::now();
        let done = pending.wait_blocking();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(done.source, CompletionSource::Timeout);
    }
}
