//! Sticky-key dispatch for a persistent subscription.
//!
//! This module delivers the ordered entry stream read from the durable log
//! to a dynamic group of consumers, with the guarantee that all messages
//! sharing a routing key are observed in log order by the same consumer at
//! any given time, even while consumers join and leave.
//!
//! # Pieces
//!
//! - [`Entry`]: a log record with a peekable sticky key.
//! - [`Consumer`] / [`ConsumerTransport`]: one attached client and the wire
//!   behind it, with permit-based flow control.
//! - [`StickyKeySelector`] / [`ConsistentHashSelector`]: key → consumer
//!   routing over a consistent-hash ring.
//! - [`RedeliverySet`] / [`RedeliveryTracker`]: positions awaiting
//!   re-dispatch and their attempt counts.
//! - [`StickyKeyDispatcher`]: the engine tying them together.
//!
//! # Flow
//!
//! The cursor yields batches; the dispatcher groups entries by the selected
//! consumer of each entry's key, applies the join-barrier ordering filter
//! and the consumer's permit cap, and hands the sendable prefix of each
//! group to that consumer's transport. Everything it refuses to send is
//! released and parked in the redelivery set, to be replayed before fresh
//! reads. Acknowledgements advance the cursor's mark-delete position, which
//! opens join barriers and triggers further reads.

mod consumer;
mod dispatcher;
mod entry;
mod redelivery;
mod selector;

pub use consumer::{Consumer, ConsumerTransport, SendError};
pub use dispatcher::{DispatcherStats, StickyKeyDispatcher};
pub use entry::{Entry, encode_keyed_payload, peek_sticky_key};
pub use redelivery::{RedeliverySet, RedeliveryTracker};
pub use selector::{ConsistentHashSelector, StickyKeySelector};
