//! Queued remote writes
//!
//! A [`Mutation`] is the single pending remote write for one order. Newer
//! edits replace its payload instead of queueing a second entry.

use super::snapshot::Order;
use super::types::MutationOp;
use serde::{Deserialize, Serialize};

/// Pending remote write for one order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mutation {
    pub order_id: String,
    pub operation: MutationOp,
    /// Full order snapshot at the latest enqueue
    pub payload: Order,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Unix millis of the first enqueue; collapsing keeps the FIFO position
    pub enqueued_at: i64,
    /// Queue sequence, breaks ties on `enqueued_at`
    pub sequence: u64,
    /// Bumped every time a newer edit collapses into this mutation
    pub revision: u64,
    /// Claimed by the sync worker
    #[serde(default)]
    pub in_flight: bool,
    /// Revision handed to the worker by the current claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_revision: Option<u64>,
    /// Earliest Unix millis at which a retry may be dequeued
    #[serde(default)]
    pub next_attempt_at: i64,
}

impl Mutation {
    pub fn new(
        order_id: impl Into<String>,
        operation: MutationOp,
        payload: Order,
        now: i64,
        sequence: u64,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            operation,
            payload,
            attempt_count: 0,
            last_error: None,
            enqueued_at: now,
            sequence,
            revision: 1,
            in_flight: false,
            claimed_revision: None,
            next_attempt_at: 0,
        }
    }

    /// Hand the current revision to the sync worker
    pub fn claim(&mut self) {
        self.in_flight = true;
        self.claimed_revision = Some(self.revision);
    }

    /// Drop the worker's claim so the mutation can be dequeued again
    pub fn release(&mut self) {
        self.in_flight = false;
        self.claimed_revision = None;
    }

    /// Whether a confirmation for `revision` belongs to the live claim
    pub fn is_claimed_at(&self, revision: u64) -> bool {
        self.in_flight && self.claimed_revision == Some(revision)
    }

    /// FIFO ordering key
    pub fn queue_key(&self) -> (i64, u64) {
        (self.enqueued_at, self.sequence)
    }

    /// Whether the worker may pick this mutation up at `now`
    pub fn is_due(&self, now: i64) -> bool {
        !self.in_flight && self.next_attempt_at <= now
    }
}

/// Why a mutation left automatic retry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadLetterReason {
    /// Attempt ceiling reached on retryable failures
    RetriesExhausted,
    /// Backend refused the write (non-retryable)
    Rejected,
}

/// Dead letter entry (surfaced to the operator, never retried automatically)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterEntry {
    pub mutation: Mutation,
    pub reason: DeadLetterReason,
    pub failed_at: i64,
    pub last_error: String,
}

impl DeadLetterEntry {
    pub fn order_id(&self) -> &str {
        &self.mutation.order_id
    }
}
