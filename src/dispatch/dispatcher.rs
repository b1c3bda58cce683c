//! The sticky-key dispatch engine.
//!
//! [`StickyKeyDispatcher`] pulls batches from the subscription cursor, fans
//! them out to consumers by routing key, and preserves per-key order across
//! consumer churn. The moving parts:
//!
//! - a [`StickyKeySelector`] mapping each entry's key to its current owner,
//! - a [`RedeliverySet`] parking entries that could not be sent,
//! - a recently-joined table freezing new consumers behind the read
//!   position they joined at, until the pre-join backlog drains,
//! - permit accounting capping every hand-off at what the consumer can
//!   accept.
//!
//! # Concurrency
//!
//! All state-mutating operations serialize on one internal async mutex.
//! Consumer sends are never awaited under it: send jobs are collected while
//! locked and spawned after release. A send completion re-enters the
//! dispatcher only through the thread-safe read trigger, so the completion
//! path never contends with a dispatch cycle for the lock.
//!
//! # Ordering across membership change
//!
//! When a consumer joins mid-stream, its hash slots inherit keys previously
//! owned by someone else. Messages for those keys that are already in
//! flight or unacknowledged must not be overtaken by newer messages handed
//! to the newcomer, so the newcomer only receives entries positioned before
//! its join snapshot until the mark-delete position catches up. Entries held
//! back this way are replayed, not dropped.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::consumer::Consumer;
use super::entry::Entry;
use super::redelivery::{RedeliverySet, RedeliveryTracker};
use super::selector::{ConsistentHashSelector, StickyKeySelector};
use crate::config::{SubscriptionConfig, SubscriptionType};
use crate::cursor::{CursorError, ManagedCursor, ReadType};
use crate::rate_limiter::DispatchRateLimiter;
use crate::types::{ConsumerId, Position};

/// Snapshot of dispatcher internals, for stats surfaces and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Number of registered consumers.
    pub consumer_count: usize,
    /// Positions currently parked for redelivery.
    pub redelivery_count: usize,
    /// Consumers still frozen behind a join barrier.
    pub recently_joined_count: usize,
    /// Sum of permits across consumers, as tracked by the dispatcher.
    pub total_available_permits: i64,
    /// Whether the stuck-on-replays escape hatch is armed.
    pub is_stuck_on_replays: bool,
}

/// A batch handed to one consumer, dispatched outside the lock.
struct SendJob {
    consumer: Arc<Consumer>,
    entries: Vec<Entry>,
    batch_sizes: Vec<usize>,
    total_messages: usize,
    total_bytes: usize,
}

/// State guarded by the dispatcher lock.
struct DispatcherState {
    consumers: HashMap<ConsumerId, Arc<Consumer>>,
    selector: Box<dyn StickyKeySelector>,
    redelivery: RedeliverySet,
    /// Join snapshots: consumer -> read position at join time. A consumer in
    /// this table receives only entries strictly below its snapshot.
    recently_joined: HashMap<ConsumerId, Position>,
    stuck_on_replays: bool,
    total_available_permits: i64,
    /// Reusable per-cycle grouping scratch; cleared, not freed, each cycle.
    grouped: HashMap<ConsumerId, Vec<Entry>>,
}

/// Key_Shared dispatcher for one persistent subscription.
pub struct StickyKeyDispatcher {
    name: String,
    cursor: Arc<dyn ManagedCursor>,
    config: SubscriptionConfig,
    topic_rate_limiter: Option<Arc<DispatchRateLimiter>>,
    subscription_rate_limiter: Option<Arc<DispatchRateLimiter>>,
    redelivery_tracker: Arc<RedeliveryTracker>,
    read_trigger: Arc<Notify>,
    stopped: AtomicBool,
    state: Mutex<DispatcherState>,
}

impl StickyKeyDispatcher {
    /// Create a dispatcher over `cursor` with a consistent-hash selector.
    pub fn new(
        name: impl Into<String>,
        cursor: Arc<dyn ManagedCursor>,
        config: SubscriptionConfig,
    ) -> Self {
        Self {
            name: name.into(),
            cursor,
            config,
            topic_rate_limiter: None,
            subscription_rate_limiter: None,
            redelivery_tracker: Arc::new(RedeliveryTracker::new()),
            read_trigger: Arc::new(Notify::new()),
            stopped: AtomicBool::new(false),
            state: Mutex::new(DispatcherState {
                consumers: HashMap::new(),
                selector: Box::new(ConsistentHashSelector::new()),
                redelivery: RedeliverySet::new(),
                recently_joined: HashMap::new(),
                stuck_on_replays: false,
                total_available_permits: 0,
                grouped: HashMap::new(),
            }),
        }
    }

    /// Replace the selector (must be called before any consumer joins).
    pub fn with_selector(mut self, selector: Box<dyn StickyKeySelector>) -> Self {
        self.state.get_mut().selector = selector;
        self
    }

    /// Attach the topic-level dispatch rate limiter.
    pub fn with_topic_rate_limiter(mut self, limiter: Arc<DispatchRateLimiter>) -> Self {
        self.topic_rate_limiter = Some(limiter);
        self
    }

    /// Attach the subscription-level dispatch rate limiter.
    pub fn with_subscription_rate_limiter(mut self, limiter: Arc<DispatchRateLimiter>) -> Self {
        self.subscription_rate_limiter = Some(limiter);
        self
    }

    /// Subscription name, for logs and stats.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The subscription mode this dispatcher serves.
    pub fn subscription_type(&self) -> SubscriptionType {
        SubscriptionType::KeyShared
    }

    /// The shared delivery-attempt counter handed to transports.
    pub fn redelivery_tracker(&self) -> Arc<RedeliveryTracker> {
        Arc::clone(&self.redelivery_tracker)
    }

    /// Whether a terminal cursor error has stopped the read loop.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Thread-safe read trigger. Safe to call from any task; multiple
    /// pending triggers collapse into one wake-up.
    pub fn notify_read(&self) {
        self.read_trigger.notify_one();
    }

    /// Spawn the read loop: each trigger runs one read-and-dispatch cycle.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                dispatcher.read_trigger.notified().await;
                if dispatcher.is_stopped() {
                    break;
                }
                dispatcher.read_more_entries().await;
                if dispatcher.is_stopped() {
                    break;
                }
            }
            debug!(subscription = %dispatcher.name, "dispatch read loop exited");
        })
    }

    /// Register a consumer with the selector.
    ///
    /// If this is not the only consumer and the subscription has an
    /// undelivered backlog, the consumer is frozen behind the current read
    /// position: keys it inherits keep draining to their previous owner
    /// until the mark-delete position passes the snapshot.
    pub async fn add_consumer(&self, consumer: &Arc<Consumer>) {
        let mut state = self.state.lock().await;
        state.selector.add_consumer(consumer.id(), consumer.name());
        state.total_available_permits += i64::from(consumer.available_permits().max(0));
        state.consumers.insert(consumer.id(), Arc::clone(consumer));

        if state.consumers.len() > 1 && self.cursor.entries_since_first_unacked() > 1 {
            state
                .recently_joined
                .insert(consumer.id(), self.cursor.read_position());
        }
        let barrier = state.recently_joined.get(&consumer.id()).copied();
        drop(state);

        info!(
            subscription = %self.name,
            consumer = %consumer.name(),
            barrier = ?barrier,
            "consumer added"
        );
        self.notify_read();
    }

    /// Deregister a consumer from the selector and drop its join snapshot.
    ///
    /// Entries already dispatched to it that get negatively acknowledged
    /// come back through [`redeliver_messages`](Self::redeliver_messages).
    pub async fn remove_consumer(&self, consumer: &Consumer) {
        let mut state = self.state.lock().await;
        state.selector.remove_consumer(consumer.id());
        if state.consumers.remove(&consumer.id()).is_some() {
            state.total_available_permits = (state.total_available_permits
                - i64::from(consumer.available_permits().max(0)))
            .max(0);
        }
        state.recently_joined.remove(&consumer.id());
        drop(state);

        info!(subscription = %self.name, consumer = %consumer.name(), "consumer removed");
    }

    /// Grant a consumer additional permits and try to read.
    pub async fn consumer_flow(&self, consumer: &Consumer, additional_permits: i32) {
        consumer.flow_permits(additional_permits);
        let mut state = self.state.lock().await;
        if state.consumers.contains_key(&consumer.id()) {
            state.total_available_permits += i64::from(additional_permits);
        }
        drop(state);
        self.notify_read();
    }

    /// Called after the cursor processed acknowledgements.
    ///
    /// Only interesting while consumers sit behind join barriers: the
    /// mark-delete position may have passed a snapshot, so a read can now
    /// make progress. Triggering redundantly is harmless.
    pub async fn on_acknowledgement_processed(&self) {
        let state = self.state.lock().await;
        let blocked_joiners = !state.recently_joined.is_empty();
        drop(state);
        if blocked_joiners {
            self.notify_read();
        }
    }

    /// Park positions for redelivery (negative acknowledgement path) and
    /// trigger a read.
    pub async fn redeliver_messages<I>(&self, positions: I)
    where
        I: IntoIterator<Item = Position>,
    {
        let mark_delete = self.cursor.mark_delete_position();
        let mut state = self.state.lock().await;
        let mut parked = 0usize;
        for position in positions {
            if position > mark_delete && state.redelivery.add(position) {
                self.redelivery_tracker.increment(position);
                parked += 1;
            }
        }
        drop(state);

        if parked > 0 {
            debug!(subscription = %self.name, parked, "messages parked for redelivery");
            self.notify_read();
        }
    }

    /// One read-and-dispatch cycle: replay parked positions first, then
    /// read fresh entries.
    ///
    /// Forward reads rely on the cursor layer to refuse reads once the
    /// subscription-wide unacked-messages ceiling is hit; the dispatcher
    /// does not enforce that ceiling itself.
    pub async fn read_more_entries(&self) {
        if self.is_stopped() {
            return;
        }

        let (replay, max_read) = {
            let mut state = self.state.lock().await;
            if state.consumers.is_empty() {
                return;
            }
            if state.total_available_permits <= 0 {
                debug!(subscription = %self.name, "read deferred: no consumer permits");
                return;
            }

            let mark_delete = self.cursor.mark_delete_position();
            state.redelivery.prune_up_to(mark_delete);
            self.redelivery_tracker.prune_up_to(mark_delete);

            let max_read = self
                .config
                .read_batch_size
                .min(state.total_available_permits.max(1) as usize);
            (Self::replay_now(&mut state, max_read), max_read)
        };

        if !replay.is_empty() {
            if let Err(error) = self.replay_entries_async(replay).await {
                self.handle_cursor_error(error);
            }
            return;
        }

        match self.cursor.read_entries(max_read).await {
            Ok(batch) => self.on_entries_read(batch, ReadType::Normal).await,
            Err(error) => self.handle_cursor_error(error),
        }
    }

    /// Positions to replay next, bounded by `max`.
    ///
    /// While the stuck-on-replays escape hatch is armed this returns an
    /// empty set exactly once and disarms, forcing one forward read past
    /// keys pinned to busy consumers.
    pub async fn messages_to_replay_now(&self, max: usize) -> BTreeSet<Position> {
        let mut state = self.state.lock().await;
        state.redelivery.prune_up_to(self.cursor.mark_delete_position());
        Self::replay_now(&mut state, max)
    }

    /// Forward parked positions to the cursor as a replay read and dispatch
    /// whatever it still holds.
    ///
    /// Returns the accepted subset; requested positions the cursor no longer
    /// holds were already deleted and are forgotten.
    pub async fn replay_entries_async(
        &self,
        positions: BTreeSet<Position>,
    ) -> Result<BTreeSet<Position>, CursorError> {
        let entries = self.cursor.replay_entries(&positions).await?;
        let accepted: BTreeSet<Position> = entries.iter().map(Entry::position).collect();

        let skipped: BTreeSet<Position> = positions.difference(&accepted).copied().collect();
        if !skipped.is_empty() {
            debug!(
                subscription = %self.name,
                skipped = skipped.len(),
                "replay positions already deleted"
            );
            let mut state = self.state.lock().await;
            state.redelivery.remove_all(&skipped);
            drop(state);
            for position in &skipped {
                self.redelivery_tracker.remove(position);
            }
        }

        self.on_entries_read(entries, ReadType::Replay).await;
        Ok(accepted)
    }

    /// Fan a batch out to consumers. The core dispatch routine.
    ///
    /// Every entry in `entries` ends up in exactly one place: handed to a
    /// consumer transport, or released with its position parked in the
    /// redelivery set, or released after a cursor rewind when no consumer is
    /// connected.
    pub async fn on_entries_read(&self, entries: Vec<Entry>, read_type: ReadType) {
        if entries.is_empty() {
            self.notify_read();
            return;
        }

        let mut state = self.state.lock().await;

        if state.consumers.is_empty() {
            debug!(
                subscription = %self.name,
                entries = entries.len(),
                "no live consumers, rewinding cursor"
            );
            drop(entries);
            self.cursor.rewind();
            return;
        }

        // Group by selected consumer, preserving input order within groups.
        let mut grouped = std::mem::take(&mut state.grouped);
        grouped.clear();
        for entry in entries {
            let key = entry.peek_sticky_key();
            match state.selector.select(&key) {
                Some(consumer_id) => grouped.entry(consumer_id).or_default().push(entry),
                None => {
                    // Selector raced empty between the consumer check and
                    // here; park the entry instead of dropping it.
                    state.redelivery.add(entry.position());
                }
            }
        }

        let remaining_groups = Arc::new(AtomicUsize::new(grouped.len()));
        let mut jobs: Vec<SendJob> = Vec::with_capacity(grouped.len());
        let mut total_messages_sent: u64 = 0;
        let mut total_bytes_sent: u64 = 0;
        let mark_delete = self.cursor.mark_delete_position();

        for (consumer_id, group) in grouped.drain() {
            let Some(consumer) = state.consumers.get(&consumer_id).cloned() else {
                for entry in group {
                    state.redelivery.add(entry.position());
                }
                continue;
            };

            let cap = group.len().min(consumer.available_permits().max(0) as usize);
            let (sendable, deferred) = Self::entries_for_consumer(
                &mut state.recently_joined,
                mark_delete,
                consumer_id,
                group,
                cap,
            );

            debug!(
                subscription = %self.name,
                consumer = %consumer.name(),
                sendable = sendable.len(),
                deferred = deferred.len(),
                read_type = %read_type,
                "dispatching key group"
            );

            if !sendable.is_empty() {
                // Replayed entries leave the redelivery set before the
                // hand-off: the transport owns and recycles them from here.
                if read_type == ReadType::Replay {
                    for entry in &sendable {
                        state.redelivery.remove(&entry.position());
                    }
                }

                let total_messages = sendable.len();
                let total_bytes: usize = sendable.iter().map(Entry::payload_len).sum();
                let batch_sizes = vec![1; total_messages];

                state.total_available_permits -= total_messages as i64;
                total_messages_sent += total_messages as u64;
                total_bytes_sent += total_bytes as u64;

                jobs.push(SendJob {
                    consumer,
                    entries: sendable,
                    batch_sizes,
                    total_messages,
                    total_bytes,
                });
            }

            for entry in deferred {
                state.redelivery.add(entry.position());
            }
        }

        // Keep the cleared scratch allocation for the next cycle.
        state.grouped = grouped;

        if self.config.dispatch_throttling_on_non_backlog_consumer_enabled
            || !self.cursor.is_active()
        {
            if let Some(limiter) = &self.topic_rate_limiter {
                limiter.try_dispatch_permit(total_messages_sent, total_bytes_sent);
            }
            if let Some(limiter) = &self.subscription_rate_limiter {
                limiter.try_dispatch_permit(total_messages_sent, total_bytes_sent);
            }
        }

        if total_messages_sent == 0 && state.recently_joined.is_empty() {
            // Nothing in this batch could go out: every key routes to a
            // consumer that is busy right now. Arm the escape hatch so the
            // next cycle reads fresh entries, which may carry keys for other
            // consumers. Skipped when join barriers are pending: reading
            // ahead then would only widen the gap the barrier is waiting on.
            state.stuck_on_replays = true;
            drop(state);
            self.notify_read();
        } else {
            drop(state);
        }

        for job in jobs {
            let remaining = Arc::clone(&remaining_groups);
            let trigger = Arc::clone(&self.read_trigger);
            let tracker = Arc::clone(&self.redelivery_tracker);
            let subscription = self.name.clone();
            tokio::spawn(async move {
                let SendJob {
                    consumer,
                    entries,
                    batch_sizes,
                    total_messages,
                    total_bytes,
                } = job;
                match consumer
                    .send_entries(entries, batch_sizes, total_messages, total_bytes, tracker)
                    .await
                {
                    Ok(()) => {
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            trigger.notify_one();
                        }
                    }
                    Err(error) => {
                        // No retry here: the transport's unack timeout
                        // brings the entries back through redelivery.
                        debug!(
                            subscription = %subscription,
                            consumer = %consumer.name(),
                            %error,
                            "send failed"
                        );
                    }
                }
            });
        }
    }

    /// Current snapshot of dispatcher internals.
    pub async fn stats(&self) -> DispatcherStats {
        let state = self.state.lock().await;
        DispatcherStats {
            consumer_count: state.consumers.len(),
            redelivery_count: state.redelivery.len(),
            recently_joined_count: state.recently_joined.len(),
            total_available_permits: state.total_available_permits,
            is_stuck_on_replays: state.stuck_on_replays,
        }
    }

    /// Positions currently parked for redelivery.
    pub async fn redelivery_positions(&self) -> BTreeSet<Position> {
        let state = self.state.lock().await;
        state.redelivery.iter().copied().collect()
    }

    /// The join snapshot a consumer is frozen behind, if any.
    pub async fn recently_joined_barrier(&self, consumer_id: ConsumerId) -> Option<Position> {
        let state = self.state.lock().await;
        state.recently_joined.get(&consumer_id).copied()
    }

    fn handle_cursor_error(&self, error: CursorError) {
        if error.is_terminal() {
            error!(subscription = %self.name, %error, "terminal cursor error, stopping dispatch");
            self.stopped.store(true, Ordering::Release);
            // Wake the loop so it observes the stop flag and exits.
            self.read_trigger.notify_one();
        } else {
            debug!(subscription = %self.name, %error, "read paused");
        }
    }

    fn replay_now(state: &mut DispatcherState, max: usize) -> BTreeSet<Position> {
        if state.stuck_on_replays {
            // One forced forward read instead of spinning on replays whose
            // consumers are busy; the flag disarms on this call.
            state.stuck_on_replays = false;
            BTreeSet::new()
        } else {
            state.redelivery.first_n(max)
        }
    }

    /// The ordering filter: the prefix of `entries` this consumer may
    /// receive now, and the remainder to defer.
    ///
    /// Entries arrive position-sorted (they came from a sequential read), so
    /// a linear scan up to `cap` finds the join-barrier divider without
    /// sorting.
    fn entries_for_consumer(
        recently_joined: &mut HashMap<ConsumerId, Position>,
        mark_delete: Position,
        consumer_id: ConsumerId,
        mut entries: Vec<Entry>,
        cap: usize,
    ) -> (Vec<Entry>, Vec<Entry>) {
        if cap == 0 {
            return (Vec::new(), entries);
        }

        let barrier = match recently_joined.get(&consumer_id) {
            None => {
                let deferred = entries.split_off(cap.min(entries.len()));
                return (entries, deferred);
            }
            Some(barrier) => *barrier,
        };

        if barrier <= mark_delete.next() {
            // The pre-join backlog has fully drained; the gate opens.
            recently_joined.remove(&consumer_id);
            let deferred = entries.split_off(cap.min(entries.len()));
            return (entries, deferred);
        }

        // Only entries published before the join may flow to this consumer.
        let mut divider = cap.min(entries.len());
        for (index, entry) in entries.iter().take(divider).enumerate() {
            if entry.position() >= barrier {
                divider = index;
                break;
            }
        }
        let deferred = entries.split_off(divider);
        (entries, deferred)
    }
}
