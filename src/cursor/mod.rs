//! Managed-log cursor contracts.
//!
//! The dispatcher never touches the durable log directly; it drives a
//! [`ManagedCursor`], a stateful reader owned by the subscription. The
//! cursor tracks two marks:
//!
//! - **read position** — the next position it will yield, and
//! - **mark-delete position** — the greatest position such that every
//!   position up to and including it has been acknowledged. It only ever
//!   moves forward.
//!
//! Reads come in two flavors, tagged with a [`ReadType`]: `Normal` reads
//! advance the read position over fresh entries, `Replay` reads re-fetch
//! positions parked in the redelivery set. The dispatcher must know which
//! kind produced a batch, because successfully dispatched replayed entries
//! have to be removed from the redelivery set.
//!
//! [`ReadOnlyCursor`](read_only::ReadOnlyCursor) is the passive-reader
//! variant with frozen write state; [`memory`] provides an in-memory cursor
//! for tests and reference use.

pub mod read_only;

#[cfg(any(test, feature = "test-utilities"))]
pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::dispatch::Entry;
use crate::types::Position;

#[cfg(any(test, feature = "test-utilities"))]
pub use memory::{MemoryCursor, MemoryLog};
pub use read_only::{LogView, ReadOnlyCursor};

/// Whether a batch of entries came from a fresh read or a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadType {
    /// Fresh entries; the read position advanced to produce them.
    Normal,
    /// Entries re-fetched for positions in the redelivery set.
    Replay,
}

impl std::fmt::Display for ReadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadType::Normal => write!(f, "Normal"),
            ReadType::Replay => write!(f, "Replay"),
        }
    }
}

/// Lifecycle state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No ledger is currently open for this cursor.
    NoLedger,
    /// The cursor is open and serving reads.
    Open,
    /// The cursor has been closed; all operations fail.
    Closed,
}

/// Errors surfaced by cursor operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// Nothing to read right now. Transient: a later acknowledgement or
    /// producer append makes entries available again.
    #[error("No more entries to read")]
    NoMoreEntries,

    /// The managed log was terminated; no further entries will ever appear.
    #[error("Managed ledger has been terminated")]
    ManagedLedgerTerminated,

    /// The cursor was closed.
    #[error("Cursor is closed")]
    CursorClosed,
}

impl CursorError {
    /// Terminal errors stop the dispatcher's read loop; transient ones
    /// merely pause it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CursorError::ManagedLedgerTerminated | CursorError::CursorClosed
        )
    }
}

/// A stateful reader over the durable log, owned by one subscription.
///
/// All read operations are asynchronous and must not block the dispatch
/// thread. Position getters are cheap synchronous snapshots.
#[async_trait]
pub trait ManagedCursor: Send + Sync {
    /// Read up to `max` entries starting at the read position, advancing it
    /// past the returned entries.
    async fn read_entries(&self, max: usize) -> Result<Vec<Entry>, CursorError>;

    /// Re-fetch the given positions for redelivery.
    ///
    /// Returns the entries still present in the log, in position order; the
    /// positions of the returned entries are the accepted subset. Requested
    /// positions that were already deleted are silently dropped.
    async fn replay_entries(&self, positions: &BTreeSet<Position>) -> Result<Vec<Entry>, CursorError>;

    /// Reset the read position to just past the mark-delete position.
    ///
    /// Used when a batch could not be delivered to anyone and must be
    /// re-read later.
    fn rewind(&self);

    /// The next position this cursor will yield.
    fn read_position(&self) -> Position;

    /// The greatest position with every predecessor acknowledged.
    fn mark_delete_position(&self) -> Position;

    /// Number of entries between the first unacknowledged message and the
    /// read position. This is the undelivered-backlog signal consulted when
    /// a consumer joins.
    fn entries_since_first_unacked(&self) -> i64;

    /// Whether the subscription is actively draining (a caught-up cursor is
    /// active; a backlogged or idle one is not).
    fn is_active(&self) -> bool;
}

/// Acknowledgement surface of a subscription cursor.
///
/// Split from [`ManagedCursor`] because the ingress side (source records)
/// only ever acknowledges; it never reads.
pub trait Acknowledger: Send + Sync {
    /// Acknowledge a single position. The mark-delete position advances over
    /// the contiguous acknowledged prefix.
    fn ack_individual(&self, position: Position);

    /// Acknowledge every position up to and including `position`.
    fn ack_cumulative(&self, position: Position);
}
