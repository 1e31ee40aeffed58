//! Global FIFO of admitted alerts awaiting delivery.
//!
//! The queue enforces a minimum gap between any two deliveries across all
//! assets and timeframes. Timing is passed in explicitly so the drain loop
//! owns the clock.

use std::collections::VecDeque;

use crate::limiter::AdmitTicket;
use crate::models::AlertCandidate;

/// An admitted candidate with the bookkeeping needed at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedAlert {
    /// Unix seconds at which the alert was enqueued.
    pub enqueued_at: i64,
    pub candidate: AlertCandidate,
    pub ticket: AdmitTicket,
    /// Delivery attempts made so far.
    pub attempts: u32,
}

/// Unbounded FIFO gated by a global inter-delivery gap.
#[derive(Debug)]
pub struct AlertQueue {
    pending: VecDeque<QueuedAlert>,
    gap_secs: i64,
    last_sent: Option<i64>,
}

impl AlertQueue {
    #[must_use]
    pub fn new(gap_secs: u64) -> Self {
        Self {
            pending: VecDeque::new(),
            gap_secs: i64::try_from(gap_secs).unwrap_or(i64::MAX),
            last_sent: None,
        }
    }

    /// Appends an admitted candidate to the tail.
    pub fn enqueue(&mut self, candidate: AlertCandidate, ticket: AdmitTicket, now: i64) {
        self.pending.push_back(QueuedAlert {
            enqueued_at: now,
            candidate,
            ticket,
            attempts: 0,
        });
    }

    /// Returns `true` once the gap since the last delivery has elapsed.
    pub fn gap_elapsed(&self, now: i64) -> bool {
        self.last_sent
            .is_none_or(|last| now.saturating_sub(last) >= self.gap_secs)
    }

    /// Pops the head if the queue is non-empty and the gap has elapsed.
    pub fn pop_ready(&mut self, now: i64) -> Option<QueuedAlert> {
        if !self.gap_elapsed(now) {
            return None;
        }
        self.pending.pop_front()
    }

    /// Records a successful delivery at `now`, starting a new gap.
    pub fn mark_sent(&mut self, now: i64) {
        self.last_sent = Some(now);
    }

    /// Puts a failed alert back at the head so order is preserved.
    pub fn retry_front(&mut self, mut alert: QueuedAlert) {
        alert.attempts += 1;
        self.pending.push_front(alert);
    }

    /// Seconds until the next delivery is allowed, zero if it is allowed now.
    pub fn wait_secs(&self, now: i64) -> i64 {
        match self.last_sent {
            Some(last) => (self.gap_secs - now.saturating_sub(last)).max(0),
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
