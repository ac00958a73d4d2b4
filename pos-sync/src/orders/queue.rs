//! Mutation queue - durable, de-duplicated pending remote writes
//!
//! ```text
//! enqueue ──▶ mutations ──dequeue_next──▶ (in flight) ──mark_synced──▶ removed
//!               ▲                              │
//!               └──────── mark_failed ◀────────┤ retryable, attempts < ceiling
//!                                              │
//!   dead_letter ◀── mark_failed (ceiling) ─────┤
//!               ◀── mark_rejected ─────────────┘
//! ```
//!
//! Every operation runs in a single redb write transaction that also updates
//! the order's `sync_state`, so the queue and the order never disagree.

use super::storage::{OrderStorage, StorageResult};
use redb::WriteTransaction;
use shared::order::{
    DeadLetterEntry, DeadLetterReason, Mutation, MutationOp, Order, SyncRecord, SyncState,
};
use shared::util::now_millis;
use std::collections::HashSet;
use std::time::Duration;

/// Default attempt ceiling before a mutation is dead-lettered
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(300);

/// Retry settings for failed remote writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// A mutation is dead-lettered once `attempt_count` reaches this value
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base * 2^(attempt - 1), capped at max
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Result of confirming a remote write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Mutation removed, order is SYNCED
    Synced,
    /// A newer edit arrived while the write was in flight; it stays queued as an update
    Superseded,
    /// Nothing left to confirm (replayed confirmation)
    AlreadyApplied,
    /// Order was deleted locally; the result is dropped
    Discarded,
}

/// Result of recording a failed remote write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Left in the queue, eligible again at `retry_at` (Unix millis)
    WillRetry { attempt: u32, retry_at: i64 },
    /// Moved to the dead letter queue, order is FAILED
    DeadLettered,
    /// Order or mutation no longer exists
    Discarded,
}

/// Pick the operation for a collapsed mutation
///
/// A create that has not been confirmed yet must stay a create; anything else
/// becomes an update.
fn collapse_operation(pending: MutationOp, has_remote_id: bool) -> MutationOp {
    match (pending, has_remote_id) {
        (MutationOp::Create, false) => MutationOp::Create,
        _ => MutationOp::Update,
    }
}

/// Durable queue of pending remote writes, one per order
#[derive(Debug, Clone)]
pub struct MutationQueue {
    storage: OrderStorage,
    policy: RetryPolicy,
}

impl MutationQueue {
    pub fn new(storage: OrderStorage, policy: RetryPolicy) -> Self {
        Self { storage, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    // ========== Enqueue ==========

    /// Enqueue a write for `order_id` in its own transaction
    pub fn enqueue(
        &self,
        order_id: &str,
        operation: MutationOp,
        payload: Order,
    ) -> StorageResult<Mutation> {
        let txn = self.storage.begin_write()?;
        let mutation = self.enqueue_txn(&txn, order_id, operation, payload)?;
        txn.commit()?;
        Ok(mutation)
    }

    /// Enqueue a write within the caller's transaction
    ///
    /// If a mutation for the order is already pending, its payload is replaced
    /// and its revision bumped instead of adding a second entry; the original
    /// FIFO position is kept. A dead-lettered mutation for the order is brought
    /// back with a fresh attempt budget, since a new edit is a new attempt.
    pub fn enqueue_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
        requested: MutationOp,
        payload: Order,
    ) -> StorageResult<Mutation> {
        let has_remote_id = payload.remote_id.is_some();

        if let Some(mut pending) = self.storage.get_mutation_txn(txn, order_id)? {
            pending.operation = collapse_operation(pending.operation, has_remote_id);
            pending.payload = payload;
            pending.revision += 1;
            self.storage.store_mutation(txn, &pending)?;
            tracing::debug!(
                order_id = %order_id,
                operation = %pending.operation,
                revision = pending.revision,
                "Collapsed edit into pending mutation"
            );
            return Ok(pending);
        }

        if let Some(dead) = self.storage.take_dead_letter(txn, order_id)? {
            let mut revived = dead.mutation;
            revived.operation = collapse_operation(revived.operation, has_remote_id);
            revived.payload = payload;
            revived.revision += 1;
            revived.attempt_count = 0;
            revived.last_error = None;
            revived.release();
            revived.next_attempt_at = 0;
            self.storage.store_mutation(txn, &revived)?;
            tracing::info!(
                order_id = %order_id,
                previous_error = %dead.last_error,
                "New edit revived dead-lettered mutation"
            );
            return Ok(revived);
        }

        // Remote id is the source of truth: an edit to a never-synced order
        // still has to create it remotely
        let operation = if has_remote_id {
            MutationOp::Update
        } else {
            MutationOp::Create
        };
        if operation != requested {
            tracing::debug!(order_id = %order_id, requested = %requested, queued = %operation, "Resolved mutation operation from remote_id");
        }

        let sequence = self.storage.next_queue_sequence(txn)?;
        let mutation = Mutation::new(order_id, operation, payload, now_millis(), sequence);
        self.storage.store_mutation(txn, &mutation)?;
        tracing::debug!(order_id = %order_id, operation = %operation, sequence, "Enqueued mutation");
        Ok(mutation)
    }

    // ========== Dequeue ==========

    /// Claim the oldest due mutation
    pub fn dequeue_next(&self) -> StorageResult<Option<Mutation>> {
        self.dequeue_next_excluding(&HashSet::new())
    }

    /// Claim the oldest due mutation whose order is not in `exclude`
    ///
    /// Skips mutations already in flight and retries whose backoff has not
    /// elapsed. The claim marks the mutation in flight and the order SYNCING in
    /// one transaction. The returned operation is resolved from the stored
    /// order's `remote_id`.
    pub fn dequeue_next_excluding(
        &self,
        exclude: &HashSet<String>,
    ) -> StorageResult<Option<Mutation>> {
        let now = now_millis();
        let txn = self.storage.begin_write()?;

        let mut claimed = None;
        for mut mutation in self.storage.get_pending_mutations_txn(&txn)? {
            if !mutation.is_due(now) || exclude.contains(&mutation.order_id) {
                continue;
            }

            let Some(mut order) = self.storage.get_order_txn(&txn, &mutation.order_id)? else {
                // Deletion removes both atomically; an orphan here is a leftover
                tracing::warn!(order_id = %mutation.order_id, "Dropping mutation for missing order");
                self.storage.remove_mutation(&txn, &mutation.order_id)?;
                continue;
            };

            mutation.claim();
            mutation.payload.remote_id = order.remote_id.clone();
            mutation.operation = if order.remote_id.is_some() {
                MutationOp::Update
            } else {
                MutationOp::Create
            };
            self.storage.store_mutation(&txn, &mutation)?;

            order.sync_state = SyncState::Syncing;
            self.storage.store_order(&txn, &order)?;

            claimed = Some(mutation);
            break;
        }

        txn.commit()?;
        Ok(claimed)
    }

    // ========== Completion ==========

    /// Confirm a remote write for the claimed `revision`
    ///
    /// Stamps `remote_id` only if the order has none; an order's remote id is
    /// never replaced. Replaying a confirmation is a no-op.
    pub fn mark_synced(
        &self,
        order_id: &str,
        remote_id: &str,
        revision: u64,
    ) -> StorageResult<SyncOutcome> {
        let now = now_millis();
        let txn = self.storage.begin_write()?;

        let Some(mut order) = self.storage.get_order_txn(&txn, order_id)? else {
            self.storage.remove_mutation(&txn, order_id)?;
            txn.commit()?;
            tracing::info!(order_id = %order_id, remote_id = %remote_id, "Order deleted while syncing, result discarded");
            return Ok(SyncOutcome::Discarded);
        };

        let mutation = self.storage.get_mutation_txn(&txn, order_id)?;
        if order.remote_id.is_some() {
            let stale = match &mutation {
                None => true,
                // An older revision that is not the live claim was confirmed before
                Some(pending) => pending.revision != revision && !pending.is_claimed_at(revision),
            };
            if stale {
                txn.abort()?;
                tracing::debug!(order_id = %order_id, revision, "Replayed confirmation ignored");
                return Ok(SyncOutcome::AlreadyApplied);
            }
        }

        let operation = match order.remote_id.as_deref() {
            None => {
                order.remote_id = Some(remote_id.to_string());
                MutationOp::Create
            }
            Some(existing) => {
                if existing != remote_id {
                    tracing::warn!(
                        order_id = %order_id,
                        existing = %existing,
                        received = %remote_id,
                        "Ignoring different remote_id for already created order"
                    );
                }
                MutationOp::Update
            }
        };
        let confirmed_remote_id = order.remote_id.clone().unwrap_or_default();
        order.sync_history.push(SyncRecord {
            at: now,
            operation,
            remote_id: confirmed_remote_id,
        });

        let outcome = match mutation {
            Some(mut pending) if pending.revision != revision => {
                // Newer edit landed mid-flight: keep it, now as an update
                if pending.is_claimed_at(revision) {
                    pending.release();
                }
                pending.operation = MutationOp::Update;
                pending.payload.remote_id = order.remote_id.clone();
                self.storage.store_mutation(&txn, &pending)?;
                order.sync_state = if pending.in_flight {
                    SyncState::Syncing
                } else {
                    SyncState::Unsynced
                };
                SyncOutcome::Superseded
            }
            Some(_) => {
                self.storage.remove_mutation(&txn, order_id)?;
                order.sync_state = SyncState::Synced;
                SyncOutcome::Synced
            }
            None => {
                order.sync_state = SyncState::Synced;
                SyncOutcome::Synced
            }
        };

        self.storage.store_order(&txn, &order)?;
        txn.commit()?;

        tracing::debug!(order_id = %order_id, remote_id = ?order.remote_id, outcome = ?outcome, "Remote write confirmed");
        Ok(outcome)
    }

    /// Record a retryable failure
    ///
    /// Increments `attempt_count` and schedules the next attempt with backoff.
    /// Once the count reaches the ceiling the mutation is dead-lettered and the
    /// order flagged FAILED instead.
    pub fn mark_failed(&self, order_id: &str, error: &str) -> StorageResult<FailureOutcome> {
        let now = now_millis();
        let txn = self.storage.begin_write()?;

        let Some(mut mutation) = self.storage.get_mutation_txn(&txn, order_id)? else {
            txn.abort()?;
            return Ok(FailureOutcome::Discarded);
        };

        mutation.attempt_count += 1;
        mutation.last_error = Some(error.to_string());
        mutation.release();

        let outcome = if mutation.attempt_count >= self.policy.max_attempts {
            tracing::error!(
                order_id = %order_id,
                attempt_count = mutation.attempt_count,
                last_error = %error,
                "Max sync attempts reached, moving to dead letter queue"
            );
            self.dead_letter_txn(&txn, mutation, DeadLetterReason::RetriesExhausted, error, now)?;
            FailureOutcome::DeadLettered
        } else {
            let delay_ms =
                i64::try_from(self.policy.backoff(mutation.attempt_count).as_millis()).unwrap_or(i64::MAX);
            let retry_at = now.saturating_add(delay_ms);
            mutation.next_attempt_at = retry_at;
            let attempt = mutation.attempt_count;
            self.storage.store_mutation(&txn, &mutation)?;
            self.set_sync_state_txn(&txn, order_id, SyncState::Unsynced)?;
            FailureOutcome::WillRetry { attempt, retry_at }
        };

        txn.commit()?;
        Ok(outcome)
    }

    /// Record a non-retryable failure: dead-letter immediately
    pub fn mark_rejected(&self, order_id: &str, error: &str) -> StorageResult<FailureOutcome> {
        let now = now_millis();
        let txn = self.storage.begin_write()?;

        let Some(mut mutation) = self.storage.get_mutation_txn(&txn, order_id)? else {
            txn.abort()?;
            return Ok(FailureOutcome::Discarded);
        };

        mutation.attempt_count += 1;
        mutation.last_error = Some(error.to_string());
        mutation.release();
        tracing::error!(order_id = %order_id, error = %error, "Backend rejected write, moving to dead letter queue");
        self.dead_letter_txn(&txn, mutation, DeadLetterReason::Rejected, error, now)?;

        txn.commit()?;
        Ok(FailureOutcome::DeadLettered)
    }

    fn dead_letter_txn(
        &self,
        txn: &WriteTransaction,
        mutation: Mutation,
        reason: DeadLetterReason,
        error: &str,
        now: i64,
    ) -> StorageResult<()> {
        let order_id = mutation.order_id.clone();
        self.storage.remove_mutation(txn, &order_id)?;
        self.storage.store_dead_letter(
            txn,
            &DeadLetterEntry {
                mutation,
                reason,
                failed_at: now,
                last_error: error.to_string(),
            },
        )?;
        self.set_sync_state_txn(txn, &order_id, SyncState::Failed)
    }

    fn set_sync_state_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
        state: SyncState,
    ) -> StorageResult<()> {
        if let Some(mut order) = self.storage.get_order_txn(txn, order_id)? {
            order.sync_state = state;
            self.storage.store_order(txn, &order)?;
        }
        Ok(())
    }

    // ========== Maintenance ==========

    /// Remove any pending or dead-lettered mutation for an order
    pub fn remove(&self, order_id: &str) -> StorageResult<bool> {
        let txn = self.storage.begin_write()?;
        let removed = self.remove_txn(&txn, order_id)?;
        txn.commit()?;
        Ok(removed)
    }

    /// Remove any pending or dead-lettered mutation for an order (within transaction)
    pub fn remove_txn(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<bool> {
        let pending = self.storage.remove_mutation(txn, order_id)?;
        let dead = self.storage.take_dead_letter(txn, order_id)?.is_some();
        Ok(pending || dead)
    }

    /// Release claims left behind by a crash mid-sync
    ///
    /// Called once when the sync worker starts. The writes are retried; the
    /// backend sees at most a repeat of an update, never a second create for
    /// an order that already has a `remote_id`.
    pub fn recover_in_flight(&self) -> StorageResult<usize> {
        let txn = self.storage.begin_write()?;
        let mut recovered = 0;

        for mut mutation in self.storage.get_pending_mutations_txn(&txn)? {
            if !mutation.in_flight {
                continue;
            }
            mutation.release();
            self.storage.store_mutation(&txn, &mutation)?;
            self.set_sync_state_txn(&txn, &mutation.order_id, SyncState::Unsynced)?;
            recovered += 1;
        }

        txn.commit()?;
        Ok(recovered)
    }

    /// Move a dead-lettered mutation back into the queue (operator action)
    ///
    /// Returns false if the order has no dead-lettered mutation.
    pub fn retry_dead_letter(&self, order_id: &str) -> StorageResult<bool> {
        let txn = self.storage.begin_write()?;

        let Some(dead) = self.storage.take_dead_letter(&txn, order_id)? else {
            txn.abort()?;
            return Ok(false);
        };

        let mut mutation = dead.mutation;
        mutation.attempt_count = 0;
        mutation.last_error = None;
        mutation.release();
        mutation.next_attempt_at = 0;
        self.storage.store_mutation(&txn, &mutation)?;
        self.set_sync_state_txn(&txn, order_id, SyncState::Unsynced)?;

        txn.commit()?;
        tracing::info!(order_id = %order_id, "Dead-lettered mutation requeued by operator");
        Ok(true)
    }

    // ========== Queries ==========

    /// Pending mutations in FIFO order
    pub fn pending(&self) -> StorageResult<Vec<Mutation>> {
        self.storage.get_pending_mutations()
    }

    /// Mutations that need manual escalation
    pub fn dead_letters(&self) -> StorageResult<Vec<DeadLetterEntry>> {
        self.storage.get_dead_letters()
    }

    pub fn get(&self, order_id: &str) -> StorageResult<Option<Mutation>> {
        self.storage.get_mutation(order_id)
    }
}
