//! # Keyshared
//! Sticky-key (Key_Shared) dispatch engine for persistent pub/sub
//! subscriptions.
//!
//! A persistent subscription reads an ordered stream of entries from a
//! durable log and delivers it to a dynamic group of consumers. This crate
//! implements the hard part of that delivery: every message carries a
//! routing key, and all messages sharing a key must be observed in log
//! order by the same consumer at any given time, even while consumers join
//! and leave mid-stream.
//!
//! # Goals
//! - Per-key ordering that survives consumer churn (join barriers) and
//!   backpressure (permit-capped hand-offs with ordered redelivery)
//! - Clean seams to the surrounding broker: the managed-log cursor, the
//!   consumer transport, and the dispatch rate limiter are traits
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/)
//!   for the async core and `conhash` for consistent-hash key routing
//!
//! ## Getting started
//!
//! Wire a [`StickyKeyDispatcher`](dispatch::StickyKeyDispatcher) over your
//! cursor implementation, register consumers, and start the read loop:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keyshared::prelude::*;
//! use keyshared::cursor::MemoryCursor;
//!
//! # struct MyTransport;
//! # #[async_trait::async_trait]
//! # impl ConsumerTransport for MyTransport {
//! #     async fn send(
//! #         &self,
//! #         _entries: Vec<Entry>,
//! #         _batch_sizes: Vec<usize>,
//! #         _total_messages: usize,
//! #         _total_bytes: usize,
//! #         _redelivery_tracker: Arc<RedeliveryTracker>,
//! #     ) -> std::result::Result<(), SendError> { Ok(()) }
//! # }
//! #[tokio::main]
//! async fn main() {
//!     let cursor = Arc::new(MemoryCursor::new(1));
//!     let dispatcher = Arc::new(StickyKeyDispatcher::new(
//!         "my-subscription",
//!         cursor,
//!         SubscriptionConfig::default(),
//!     ));
//!
//!     let consumer = Consumer::new("worker-1", 1000, Arc::new(MyTransport));
//!     dispatcher.add_consumer(&consumer).await;
//!
//!     let handle = dispatcher.start();
//!     dispatcher.notify_read();
//!     # drop(handle);
//! }
//! ```
//!
//! The dispatcher owns no persistent state: the cursor persists the
//! mark-delete position, and the in-memory redelivery set rebuilds from the
//! gap between mark-delete and read position after a restart.

#![forbid(unsafe_code)]

pub mod config;
pub mod constants;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod rate_limiter;
pub mod source;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Main exports for subscription hosts.
    //!
    //! Everything needed to wire a Key_Shared dispatcher into a topic:
    //! the dispatcher itself, consumer handles, the cursor and transport
    //! seams, and the configuration types.

    pub use crate::config::{DispatchRate, SubscriptionConfig, SubscriptionType};
    pub use crate::cursor::{Acknowledger, CursorError, ManagedCursor, ReadType};
    pub use crate::dispatch::{
        Consumer, ConsumerTransport, Entry, RedeliveryTracker, SendError, StickyKeyDispatcher,
    };
    pub use crate::error::{Error, Result};
    pub use crate::rate_limiter::DispatchRateLimiter;
    pub use crate::source::{ProcessingGuarantee, SourceRecord, SubscriptionSource};
    pub use crate::types::{ConsumerId, Position};

    pub use bytes;
}
