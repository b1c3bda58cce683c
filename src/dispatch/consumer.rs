//! Consumer handles and the transport seam.
//!
//! A [`Consumer`] is the dispatcher's view of one attached client: an
//! identity, a permit balance, a liveness flag, and a [`ConsumerTransport`]
//! that actually pushes entries over the wire. Equality is identity — two
//! consumers with the same display name are still distinct registrations.
//!
//! Permits are flow-control credits granted by the client: one permit means
//! "I can accept one more message". The dispatcher caps every hand-off at
//! the current balance and charges the balance when entries go out; the
//! client replenishes it with [`Consumer::flow_permits`] as it drains its
//! receive queue.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use thiserror::Error;

use super::entry::Entry;
use super::redelivery::RedeliveryTracker;
use crate::types::ConsumerId;

/// Errors from a consumer transport send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The consumer disconnected while the send was in flight. Affected
    /// entries come back through the unacknowledged-message timeout; the
    /// dispatcher does not retry.
    #[error("Consumer '{consumer}' disconnected")]
    ConsumerDisconnected {
        /// Display name of the consumer.
        consumer: String,
    },

    /// The transport failed for another reason.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Wire-level delivery to one consumer.
///
/// `send` resolves when the transport has accepted the batch, not when the
/// client acknowledges it; acknowledgements travel through the subscription
/// cursor. Implementations must preserve entry order within one call.
#[async_trait]
pub trait ConsumerTransport: Send + Sync {
    /// Push a batch of entries to the consumer.
    ///
    /// `batch_sizes[i]` is the number of messages packed in `entries[i]`;
    /// `total_messages` and `total_bytes` are their sums, precomputed so the
    /// transport does not re-scan the batch. The redelivery tracker exposes
    /// per-position delivery-attempt counts for the client's metadata.
    async fn send(
        &self,
        entries: Vec<Entry>,
        batch_sizes: Vec<usize>,
        total_messages: usize,
        total_bytes: usize,
        redelivery_tracker: Arc<RedeliveryTracker>,
    ) -> Result<(), SendError>;
}

/// One attached consumer, as tracked by the dispatcher.
pub struct Consumer {
    id: ConsumerId,
    name: String,
    permits: AtomicI32,
    live: AtomicBool,
    transport: Arc<dyn ConsumerTransport>,
}

impl Consumer {
    /// Register a consumer with an initial permit balance.
    pub fn new(
        name: impl Into<String>,
        initial_permits: i32,
        transport: Arc<dyn ConsumerTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ConsumerId::allocate(),
            name: name.into(),
            permits: AtomicI32::new(initial_permits),
            live: AtomicBool::new(true),
            transport,
        })
    }

    /// The consumer's identity.
    #[inline]
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Display name, for logs and stats.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current permit balance. May be observed negative transiently while a
    /// send is charging it.
    #[inline]
    pub fn available_permits(&self) -> i32 {
        self.permits.load(Ordering::Acquire)
    }

    /// Grant additional send permits.
    pub fn flow_permits(&self, permits: i32) {
        self.permits.fetch_add(permits, Ordering::AcqRel);
    }

    /// Whether the consumer is still connected.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Mark the consumer as disconnected.
    pub fn mark_disconnected(&self) {
        self.live.store(false, Ordering::Release);
    }

    /// Charge the permit balance and hand a batch to the transport.
    ///
    /// Permits are charged up front, before the transport resolves, so a
    /// concurrent dispatch cycle cannot double-spend them.
    pub async fn send_entries(
        &self,
        entries: Vec<Entry>,
        batch_sizes: Vec<usize>,
        total_messages: usize,
        total_bytes: usize,
        redelivery_tracker: Arc<RedeliveryTracker>,
    ) -> Result<(), SendError> {
        self.permits
            .fetch_sub(total_messages as i32, Ordering::AcqRel);
        if !self.is_live() {
            return Err(SendError::ConsumerDisconnected {
                consumer: self.name.clone(),
            });
        }
        self.transport
            .send(
                entries,
                batch_sizes,
                total_messages,
                total_bytes,
                redelivery_tracker,
            )
            .await
    }
}

impl PartialEq for Consumer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Consumer {}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("permits", &self.available_permits())
            .field("live", &self.is_live())
            .finish()
    }
}
