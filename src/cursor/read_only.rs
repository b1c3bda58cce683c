//! Read-only cursor for passive readers.
//!
//! A [`ReadOnlyCursor`] walks the log without owning any write state: it
//! never acknowledges, never persists a mark, and keeps no durable state at
//! all. Peek tooling and catch-up readers use it to scan a topic without
//! disturbing subscriptions.

use std::sync::Arc;
use tracing::info;

use super::CursorState;
use crate::types::{Position, PositionRange};

/// Read-side view of a managed log, enough to place and move a cursor.
pub trait LogView: Send + Sync {
    /// The log-head marker: the position just before the first entry.
    /// For an empty log this equals [`last_position`](Self::last_position).
    fn head_position(&self) -> Position;

    /// Position of the last entry in the log, or the head marker when the
    /// log is empty.
    fn last_position(&self) -> Position;

    /// Number of entries within the closed range.
    fn entries_in_range(&self, range: PositionRange) -> i64;

    /// The position `n` entries after `from`, exclusive of `from` itself,
    /// clamped to just past the tail.
    fn position_after_n(&self, from: Position, n: usize) -> Position;
}

/// A cursor with frozen write state.
///
/// Initial state is [`CursorState::NoLedger`]; no ledger is ever opened on
/// its behalf because it has nothing to persist.
pub struct ReadOnlyCursor {
    log: Arc<dyn LogView>,
    read_position: Position,
    messages_consumed_counter: i64,
    state: CursorState,
}

impl ReadOnlyCursor {
    /// Place a cursor at `start`, or just past the log head for
    /// [`Position::EARLIEST`].
    ///
    /// The consumed counter starts at zero when nothing lies at or after the
    /// read position, otherwise at the negation of the entry count between
    /// the read position and the tail: forward consumption drives it toward
    /// zero, and its sign is the uniform "has more to read" check.
    pub fn new(log: Arc<dyn LogView>, start: Position) -> Self {
        let read_position = if start == Position::EARLIEST {
            log.head_position().next()
        } else {
            start
        };

        let messages_consumed_counter = if log.last_position() <= read_position {
            0
        } else {
            -log.entries_in_range(PositionRange::closed(read_position, log.last_position()))
        };

        Self {
            log,
            read_position,
            messages_consumed_counter,
            state: CursorState::NoLedger,
        }
    }

    /// The next position this cursor would yield.
    pub fn read_position(&self) -> Position {
        self.read_position
    }

    /// Negative while entries remain between the read position and the
    /// tail; see [`has_more_entries`](Self::has_more_entries).
    pub fn messages_consumed_counter(&self) -> i64 {
        self.messages_consumed_counter
    }

    /// Whether entries remain to read.
    pub fn has_more_entries(&self) -> bool {
        self.messages_consumed_counter < 0
    }

    /// Record that `count` entries were consumed.
    pub fn entries_consumed(&mut self, count: i64) {
        self.messages_consumed_counter += count;
    }

    /// Advance the read position by `n` entries, exclusive of the current
    /// position.
    pub fn skip_entries(&mut self, n: usize) {
        info!(skipped = n, "skipping entries on read-only cursor");
        self.read_position = self.log.position_after_n(self.read_position, n);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Close the cursor. Completes synchronously: there is no persistent
    /// state to flush, so the closed state is observable immediately.
    pub fn close(&mut self) {
        self.state = CursorState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::MemoryLog;

    #[test]
    fn test_earliest_places_after_log_head() {
        let log = Arc::new(MemoryLog::new(3, 10));
        let cursor = ReadOnlyCursor::new(log, Position::EARLIEST);
        assert_eq!(cursor.read_position(), Position::new(3, 0));
    }

    #[test]
    fn test_explicit_start_position_is_kept() {
        let log = Arc::new(MemoryLog::new(3, 10));
        let cursor = ReadOnlyCursor::new(log, Position::new(3, 4));
        assert_eq!(cursor.read_position(), Position::new(3, 4));
    }

    #[test]
    fn test_counter_zero_on_empty_log() {
        let log = Arc::new(MemoryLog::new(3, 0));
        let cursor = ReadOnlyCursor::new(log, Position::EARLIEST);
        assert_eq!(cursor.messages_consumed_counter(), 0);
        assert!(!cursor.has_more_entries());
    }

    #[test]
    fn test_counter_is_negated_backlog() {
        let log = Arc::new(MemoryLog::new(3, 10));
        // Entries 4..=9 remain: counter starts at -6.
        let cursor = ReadOnlyCursor::new(log, Position::new(3, 4));
        assert_eq!(cursor.messages_consumed_counter(), -6);
        assert!(cursor.has_more_entries());
    }

    #[test]
    fn test_counter_zero_when_positioned_past_tail() {
        let log = Arc::new(MemoryLog::new(3, 10));
        let cursor = ReadOnlyCursor::new(log, Position::new(3, 10));
        assert_eq!(cursor.messages_consumed_counter(), 0);
        assert!(!cursor.has_more_entries());
    }

    #[test]
    fn test_consumption_drives_counter_to_zero() {
        let log = Arc::new(MemoryLog::new(1, 3));
        let mut cursor = ReadOnlyCursor::new(log, Position::EARLIEST);
        assert_eq!(cursor.messages_consumed_counter(), -3);
        cursor.entries_consumed(2);
        assert!(cursor.has_more_entries());
        cursor.entries_consumed(1);
        assert!(!cursor.has_more_entries());
    }

    #[test]
    fn test_skip_entries_is_start_excluded() {
        let log = Arc::new(MemoryLog::new(3, 10));
        let mut cursor = ReadOnlyCursor::new(log, Position::new(3, 2));
        cursor.skip_entries(3);
        assert_eq!(cursor.read_position(), Position::new(3, 5));
    }

    #[test]
    fn test_skip_clamps_at_tail() {
        let log = Arc::new(MemoryLog::new(3, 5));
        let mut cursor = ReadOnlyCursor::new(log, Position::new(3, 2));
        cursor.skip_entries(100);
        assert_eq!(cursor.read_position(), Position::new(3, 5));
    }

    #[test]
    fn test_initial_state_and_close() {
        let log = Arc::new(MemoryLog::new(3, 1));
        let mut cursor = ReadOnlyCursor::new(log, Position::EARLIEST);
        assert_eq!(cursor.state(), CursorState::NoLedger);
        cursor.close();
        assert_eq!(cursor.state(), CursorState::Closed);
    }
}
