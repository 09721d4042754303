use crate::backend::{Backend, Cancelled, Quota, QuotaStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline used when `instant + period` does not fit the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn expiry(admitted_at: Instant, period: Duration) -> Instant {
    admitted_at
        .checked_add(period)
        .unwrap_or_else(|| admitted_at + FAR_FUTURE)
}

/// A sliding window rate limiter [Backend] that keeps recent admissions in memory.
///
/// At most [Quota::permits()] requests are admitted within any trailing [Quota::period()].
/// Callers that have to wait are served strictly in the order they arrived.
#[derive(Clone)]
pub struct SlidingWindowBackend(Arc<Inner>);

struct Inner {
    quota: Quota,
    /// Callers line up here (FIFO) before they may look at the window; only the holder waits on
    /// the queue.
    turnstile: tokio::sync::Mutex<()>,
    queue: Mutex<RequestQueue>,
    /// Signalled whenever a slot is handed back early.
    released: Notify,
}

/// Proof that a request was admitted, used to hand the slot back via [Backend::rollback].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    id: u64,
    admitted_at: Instant,
}

impl Admission {
    /// The instant at which the request entered the window.
    pub fn admitted_at(&self) -> Instant {
        self.admitted_at
    }
}

/// Admissions still inside the window, oldest first.
#[derive(Default)]
struct RequestQueue {
    entries: VecDeque<Admission>,
    next_id: u64,
}

impl RequestQueue {
    /// Drops every admission that has left the window, returning whether any did.
    fn evict_expired(&mut self, now: Instant, period: Duration) -> bool {
        // Nothing can be older than the clock's origin.
        let Some(window_start) = now.checked_sub(period) else {
            return false;
        };
        let before = self.entries.len();
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.admitted_at <= window_start)
        {
            self.entries.pop_front();
        }
        self.entries.len() != before
    }

    fn try_admit(&mut self, now: Instant, permits: u32) -> Option<Admission> {
        if self.entries.len() >= permits as usize {
            return None;
        }
        let admission = Admission {
            id: self.next_id,
            admitted_at: now,
        };
        self.next_id += 1;
        self.entries.push_back(admission);
        Some(admission)
    }

    fn remove(&mut self, admission: Admission) -> bool {
        match self.entries.iter().position(|e| e.id == admission.id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    fn next_expiry(&self, period: Duration) -> Option<Instant> {
        self.entries
            .front()
            .map(|entry| expiry(entry.admitted_at, period))
    }
}

impl SlidingWindowBackend {
    pub fn new(quota: Quota) -> Self {
        Self(Arc::new(Inner {
            quota,
            turnstile: tokio::sync::Mutex::new(()),
            queue: Mutex::new(RequestQueue::default()),
            released: Notify::new(),
        }))
    }

    pub fn quota(&self) -> Quota {
        self.0.quota
    }

    /// Admit a request only if a slot is free right now.
    ///
    /// Returns [None] if the window is full, or if another caller is already waiting; a waiting
    /// caller is never overtaken.
    pub fn try_request(&self) -> Option<Admission> {
        let _turn = self.0.turnstile.try_lock().ok()?;
        let mut queue = self.0.queue.lock();
        let now = Instant::now();
        queue.evict_expired(now, self.0.quota.period());
        queue.try_admit(now, self.0.quota.permits())
    }

    /// No other handle shares this backend and its window is empty, so dropping it loses
    /// nothing.
    #[cfg(feature = "dashmap")]
    pub(crate) fn is_idle(&self) -> bool {
        if Arc::strong_count(&self.0) > 1 {
            return false;
        }
        let mut queue = self.0.queue.lock();
        queue.evict_expired(Instant::now(), self.0.quota.period());
        queue.entries.is_empty()
    }

    /// Inspect the window without admitting anything.
    pub fn status(&self) -> QuotaStatus {
        let mut queue = self.0.queue.lock();
        let now = Instant::now();
        queue.evict_expired(now, self.0.quota.period());
        let limit = u64::from(self.0.quota.permits());
        QuotaStatus {
            limit,
            remaining: limit.saturating_sub(queue.entries.len() as u64),
            reset: queue.next_expiry(self.0.quota.period()).unwrap_or(now),
        }
    }
}

impl Inner {
    /// Must only be called while holding the turnstile.
    async fn wait_for_slot(&self, cancel: &CancellationToken) -> Result<Admission, Cancelled> {
        let permits = self.quota.permits();
        let period = self.quota.period();
        let mut waiting = false;
        loop {
            let released = self.released.notified();
            tokio::pin!(released);

            let deadline = {
                let mut queue = self.queue.lock();
                let now = Instant::now();
                let evicted = queue.evict_expired(now, period);
                if cancel.is_cancelled() {
                    return Err(Cancelled);
                }
                if let Some(admission) = queue.try_admit(now, permits) {
                    log::trace!(
                        "Request admitted, {} of {} slots in use",
                        queue.entries.len(),
                        permits
                    );
                    return Ok(admission);
                }
                if evicted {
                    continue;
                }
                // Registered before the lock is released, so an early release in between still
                // wakes us.
                released.as_mut().enable();
                queue
                    .next_expiry(period)
                    .unwrap_or_else(|| expiry(now, period))
            };

            if !waiting {
                log::debug!(
                    "Rate limit of {} per {:?} reached, waiting for a free slot",
                    permits,
                    period
                );
                waiting = true;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("Request cancelled while waiting for a free slot");
                    return Err(Cancelled);
                }
                _ = &mut released => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }
}

#[async_trait]
impl Backend for SlidingWindowBackend {
    type RollbackToken = Admission;
    type Error = Cancelled;

    async fn request(&self, cancel: &CancellationToken) -> Result<Admission, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Request cancelled while queued for admission");
                return Err(Cancelled);
            }
            turn = self.0.turnstile.lock() => turn,
        };
        // The turnstile is released on return, before the request itself is sent.
        self.0.wait_for_slot(cancel).await
    }

    async fn rollback(&self, token: Admission) -> Result<(), Cancelled> {
        let removed = self.0.queue.lock().remove(token);
        if removed {
            log::debug!("Released rate limit slot admitted at {:?}", token.admitted_at);
            self.0.released.notify_waiters();
        }
        Ok(())
    }
}
