//! In-memory managed log and cursor.
//!
//! [`MemoryCursor`] implements the full [`ManagedCursor`] contract over an
//! in-memory ledger, including individual and cumulative acknowledgement
//! with mark-delete advancement. Tests and examples drive the dispatcher
//! end to end with it; it also serves as the reference implementation of
//! the cursor contract's edge cases (rewind, replay acceptance, the
//! undelivered-backlog count).
//!
//! [`MemoryLog`] is the matching [`LogView`] for read-only cursors.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::Mutex;

use super::read_only::LogView;
use super::{Acknowledger, CursorError, CursorState, ManagedCursor};
use crate::dispatch::Entry;
use crate::types::{Position, PositionRange};

struct Inner {
    ledger_id: i64,
    next_entry_id: i64,
    entries: BTreeMap<Position, Bytes>,
    read_position: Position,
    mark_delete: Position,
    /// Individually acknowledged positions above the mark-delete.
    acked: BTreeSet<Position>,
    active: bool,
    terminated: bool,
    state: CursorState,
}

impl Inner {
    fn advance_mark_delete(&mut self) {
        loop {
            let next = self.mark_delete.next();
            if self.acked.remove(&next) {
                self.mark_delete = next;
            } else {
                break;
            }
        }
    }
}

/// An in-memory subscription cursor over a single ledger.
///
/// Appends go to the tail; positions are `(ledger_id, 0..)`. The mark-delete
/// position starts at the `(ledger_id, -1)` sentinel.
pub struct MemoryCursor {
    inner: Mutex<Inner>,
}

impl MemoryCursor {
    /// Create an empty cursor over ledger `ledger_id`.
    pub fn new(ledger_id: i64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ledger_id,
                next_entry_id: 0,
                entries: BTreeMap::new(),
                read_position: Position::new(ledger_id, 0),
                mark_delete: Position::new(ledger_id, -1),
                acked: BTreeSet::new(),
                active: true,
                terminated: false,
                state: CursorState::Open,
            }),
        }
    }

    /// Append a framed payload to the log tail, returning its position.
    pub fn append(&self, payload: Bytes) -> Position {
        let mut inner = self.lock();
        let position = Position::new(inner.ledger_id, inner.next_entry_id);
        inner.next_entry_id += 1;
        inner.entries.insert(position, payload);
        position
    }

    /// Mark the subscription as caught-up (active) or backlogged.
    pub fn set_active(&self, active: bool) {
        self.lock().active = active;
    }

    /// Terminate the ledger: current entries stay readable, reads past the
    /// tail fail terminally.
    pub fn terminate(&self) {
        self.lock().terminated = true;
    }

    /// Close the cursor; every subsequent operation fails.
    pub fn close(&self) {
        self.lock().state = CursorState::Closed;
    }

    /// Acknowledge one position; the mark-delete advances over the
    /// contiguous acknowledged prefix.
    pub fn ack_individual(&self, position: Position) {
        let mut inner = self.lock();
        if position > inner.mark_delete {
            inner.acked.insert(position);
            inner.advance_mark_delete();
        }
    }

    /// Acknowledge everything up to and including `position`.
    pub fn ack_cumulative(&self, position: Position) {
        let mut inner = self.lock();
        if position > inner.mark_delete {
            inner.mark_delete = position;
            let above: BTreeSet<Position> = inner.acked.split_off(&position.next());
            inner.acked = above;
            inner.advance_mark_delete();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory cursor lock poisoned")
    }
}

#[async_trait]
impl ManagedCursor for MemoryCursor {
    async fn read_entries(&self, max: usize) -> Result<Vec<Entry>, CursorError> {
        let mut inner = self.lock();
        if inner.state == CursorState::Closed {
            return Err(CursorError::CursorClosed);
        }

        let from = inner.read_position;
        let batch: Vec<Entry> = inner
            .entries
            .range((Included(from), Unbounded))
            .take(max)
            .map(|(position, payload)| Entry::new(*position, payload.clone()))
            .collect();

        if batch.is_empty() {
            return if inner.terminated {
                Err(CursorError::ManagedLedgerTerminated)
            } else {
                Err(CursorError::NoMoreEntries)
            };
        }

        inner.read_position = batch[batch.len() - 1].position().next();
        Ok(batch)
    }

    async fn replay_entries(
        &self,
        positions: &BTreeSet<Position>,
    ) -> Result<Vec<Entry>, CursorError> {
        let inner = self.lock();
        if inner.state == CursorState::Closed {
            return Err(CursorError::CursorClosed);
        }

        // Acknowledged positions count as deleted: they are not replayed.
        let accepted = positions
            .iter()
            .filter(|position| **position > inner.mark_delete)
            .filter_map(|position| {
                inner
                    .entries
                    .get(position)
                    .map(|payload| Entry::new(*position, payload.clone()))
            })
            .collect();
        Ok(accepted)
    }

    fn rewind(&self) {
        let mut inner = self.lock();
        inner.read_position = inner.mark_delete.next();
    }

    fn read_position(&self) -> Position {
        self.lock().read_position
    }

    fn mark_delete_position(&self) -> Position {
        self.lock().mark_delete
    }

    fn entries_since_first_unacked(&self) -> i64 {
        let inner = self.lock();
        inner
            .entries
            .range((Excluded(inner.mark_delete), Included(inner.read_position)))
            .count() as i64
    }

    fn is_active(&self) -> bool {
        self.lock().active
    }
}

impl Acknowledger for MemoryCursor {
    fn ack_individual(&self, position: Position) {
        MemoryCursor::ack_individual(self, position);
    }

    fn ack_cumulative(&self, position: Position) {
        MemoryCursor::ack_cumulative(self, position);
    }
}

/// A fixed in-memory log shape for read-only cursors: `entry_count`
/// contiguous entries in one ledger.
pub struct MemoryLog {
    ledger_id: i64,
    entry_count: i64,
}

impl MemoryLog {
    /// A log with entries `(ledger_id, 0)..(ledger_id, entry_count)`.
    pub fn new(ledger_id: i64, entry_count: i64) -> Self {
        Self {
            ledger_id,
            entry_count,
        }
    }
}

impl LogView for MemoryLog {
    fn head_position(&self) -> Position {
        Position::new(self.ledger_id, -1)
    }

    fn last_position(&self) -> Position {
        if self.entry_count == 0 {
            self.head_position()
        } else {
            Position::new(self.ledger_id, self.entry_count - 1)
        }
    }

    fn entries_in_range(&self, range: PositionRange) -> i64 {
        if range.is_empty() || self.entry_count == 0 {
            return 0;
        }
        let from = range.from.entry_id.max(0);
        let to = range.to.entry_id.min(self.entry_count - 1);
        (to - from + 1).max(0)
    }

    fn position_after_n(&self, from: Position, n: usize) -> Position {
        let target = from.entry_id.saturating_add(n as i64);
        Position::new(self.ledger_id, target.min(self.entry_count))
    }
}
