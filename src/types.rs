//! Type-safe primitives for durable-log coordinates.
//!
//! These newtypes prevent mixing up the different integer values that flow
//! through the dispatch path: log coordinates, consumer identities, and
//! permit counts all share integer representations but have different
//! semantic meanings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A coordinate in the durable log: a `(ledger_id, entry_id)` pair ordered
/// lexicographically.
///
/// Positions are immutable and totally ordered. The broker appends entries
/// to a sequence of ledgers; within one ledger, entry ids are contiguous.
///
/// # Special Values
///
/// - [`Position::EARLIEST`] (`-1:-1`) sorts before every real coordinate and
///   means "start of the log" when opening a cursor.
/// - A mark-delete position of `(ledger, -1)` means "nothing acknowledged in
///   this ledger yet"; its [`next()`](Position::next) is the ledger's first
///   entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    /// Identifier of the ledger holding the entry.
    pub ledger_id: i64,
    /// Index of the entry within its ledger.
    pub entry_id: i64,
}

impl Position {
    /// Sorts before every real log coordinate.
    pub const EARLIEST: Self = Position {
        ledger_id: -1,
        entry_id: -1,
    };

    /// Create a position from raw coordinates.
    #[inline]
    pub const fn new(ledger_id: i64, entry_id: i64) -> Self {
        Position {
            ledger_id,
            entry_id,
        }
    }

    /// The position immediately after this one.
    ///
    /// Same ledger with `entry_id + 1` when that is representable, otherwise
    /// the first entry of the successor ledger.
    #[inline]
    pub const fn next(self) -> Self {
        match self.entry_id.checked_add(1) {
            Some(entry_id) => Position {
                ledger_id: self.ledger_id,
                entry_id,
            },
            None => Position {
                ledger_id: self.ledger_id + 1,
                entry_id: 0,
            },
        }
    }

    /// Whether this position refers to a real entry (non-negative ids).
    #[inline]
    pub const fn is_concrete(self) -> bool {
        self.ledger_id >= 0 && self.entry_id >= 0
    }
}

impl From<(i64, i64)> for Position {
    fn from((ledger_id, entry_id): (i64, i64)) -> Self {
        Position {
            ledger_id,
            entry_id,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ledger_id, self.entry_id)
    }
}

/// A closed interval of log positions.
///
/// Used for counting backlog between two cursor marks and for range checks
/// over the redelivery set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRange {
    /// Inclusive lower bound.
    pub from: Position,
    /// Inclusive upper bound.
    pub to: Position,
}

impl PositionRange {
    /// Create a closed range `[from, to]`.
    #[inline]
    pub const fn closed(from: Position, to: Position) -> Self {
        PositionRange { from, to }
    }

    /// Whether the range contains no positions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    /// Whether `position` falls inside the range.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        self.from <= position && position <= self.to
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Identity of a consumer attached to a subscription.
///
/// Consumers are referentially unique; two consumers with the same display
/// name are still distinct. Ids are allocated from a process-wide counter
/// and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsumerId(pub u64);

static NEXT_CONSUMER_ID: AtomicU64 = AtomicU64::new(1);

impl ConsumerId {
    /// Allocate the next unused consumer id.
    pub fn allocate() -> Self {
        ConsumerId(NEXT_CONSUMER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
