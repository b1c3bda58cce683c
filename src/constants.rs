//! Centralized dispatch and subscription constants.
//!
//! This module consolidates the magic numbers used throughout the dispatch
//! path. Having them in one place makes it easier to:
//!
//! - Understand the flow-control constraints
//! - Update values consistently
//! - Document the rationale for each constant

// =============================================================================
// Dispatch Constants
// =============================================================================

/// Default maximum number of entries pulled from the cursor per read.
///
/// Larger batches amortize read overhead but increase the amount of work a
/// single dispatch cycle does under the dispatcher lock.
pub const DEFAULT_READ_BATCH_SIZE: usize = 100;

/// Default per-consumer ceiling on unacknowledged messages.
///
/// Once a consumer has this many messages outstanding, the transport stops
/// granting it permits until acknowledgements arrive.
pub const DEFAULT_MAX_UNACKED_MESSAGES_PER_CONSUMER: usize = 50_000;

/// Default subscription-wide ceiling on unacknowledged messages.
///
/// Enforced at the cursor layer: reads past this backlog are refused. The
/// dispatcher relies on this ceiling to bound how far the stuck-on-replays
/// escape hatch can run ahead of the mark-delete position.
pub const DEFAULT_MAX_UNACKED_MESSAGES_PER_SUBSCRIPTION: usize = 200_000;

// =============================================================================
// Sticky-Key Constants
// =============================================================================

/// Number of hash points placed on the ring for each consumer.
///
/// Higher values give a more even key distribution at the cost of ring
/// memory. With N consumers the ring has N * 100 points.
pub const VIRTUAL_NODES_PER_CONSUMER: usize = 100;

/// Routing key used for entries that carry no sticky key.
///
/// Routing keyless entries through one fixed key keeps them ordered relative
/// to each other on a single consumer.
pub const NONE_KEY: &[u8] = b"NONE_KEY";

/// Size of the big-endian length prefix in front of the sticky key.
pub const STICKY_KEY_LENGTH_PREFIX: usize = 2;

/// Maximum accepted sticky-key length in bytes.
///
/// Keys are hashed, not stored, so this bound only guards against malformed
/// length prefixes claiming most of the payload is key.
pub const MAX_STICKY_KEY_SIZE: usize = 1024;

// =============================================================================
// Rate Limiting Constants
// =============================================================================

/// Default refill period for dispatch rate limiters, in seconds.
pub const DEFAULT_DISPATCH_RATE_PERIOD_SECS: u64 = 1;

// =============================================================================
// Source Constants
// =============================================================================

/// Default capacity of the push-source record queue.
///
/// Bounds how far ingress can run ahead of the processing side before
/// `received` calls start applying backpressure.
pub const DEFAULT_SOURCE_QUEUE_CAPACITY: usize = 1_000;
