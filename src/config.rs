//! Subscription and dispatch configuration.
//!
//! [`SubscriptionConfig`] collects the knobs the dispatcher reads; rate
//! limits are described by [`DispatchRate`] and wired in as
//! [`DispatchRateLimiter`](crate::rate_limiter::DispatchRateLimiter)
//! instances by the host. Everything has conservative defaults from
//! [`crate::constants`].

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DISPATCH_RATE_PERIOD_SECS, DEFAULT_MAX_UNACKED_MESSAGES_PER_CONSUMER,
    DEFAULT_MAX_UNACKED_MESSAGES_PER_SUBSCRIPTION, DEFAULT_READ_BATCH_SIZE,
};

/// Subscription modes a topic supports.
///
/// The sticky-key dispatcher reports [`SubscriptionType::KeyShared`]; the
/// other variants exist so hosts can route a subscribe request to the right
/// dispatcher implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubscriptionType {
    /// Single consumer, exclusive access.
    Exclusive,
    /// Round-robin across consumers, no ordering guarantee.
    Shared,
    /// Single active consumer with warm standbys.
    Failover,
    /// Per-key ordered fan-out across consumers.
    #[default]
    KeyShared,
}

impl std::fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionType::Exclusive => write!(f, "Exclusive"),
            SubscriptionType::Shared => write!(f, "Shared"),
            SubscriptionType::Failover => write!(f, "Failover"),
            SubscriptionType::KeyShared => write!(f, "Key_Shared"),
        }
    }
}

impl std::str::FromStr for SubscriptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exclusive" => Ok(SubscriptionType::Exclusive),
            "shared" => Ok(SubscriptionType::Shared),
            "failover" => Ok(SubscriptionType::Failover),
            "key_shared" | "key-shared" | "keyshared" => Ok(SubscriptionType::KeyShared),
            _ => Err(format!(
                "Unknown subscription type '{}'. Valid types: exclusive, shared, failover, key_shared",
                s
            )),
        }
    }
}

/// A dispatch rate: message and byte budgets per refill period.
///
/// A budget of `0` means that dimension is unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRate {
    /// Messages allowed per period. `0` = unlimited.
    pub msgs_per_period: u64,
    /// Bytes allowed per period. `0` = unlimited.
    pub bytes_per_period: u64,
    /// Refill period in seconds.
    pub period_secs: u64,
}

impl Default for DispatchRate {
    fn default() -> Self {
        Self {
            msgs_per_period: 0,
            bytes_per_period: 0,
            period_secs: DEFAULT_DISPATCH_RATE_PERIOD_SECS,
        }
    }
}

impl DispatchRate {
    /// Whether this rate constrains anything at all.
    pub fn is_limiting(&self) -> bool {
        self.msgs_per_period > 0 || self.bytes_per_period > 0
    }
}

/// Configuration read by the sticky-key dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Subscription mode. The sticky-key dispatcher only serves
    /// [`SubscriptionType::KeyShared`].
    pub subscription_type: SubscriptionType,

    /// Maximum entries requested from the cursor per read.
    pub read_batch_size: usize,

    /// Per-consumer unacknowledged-message ceiling, enforced by the
    /// transport's permit accounting.
    pub max_unacked_messages_per_consumer: usize,

    /// Subscription-wide unacknowledged-message ceiling, enforced at the
    /// cursor layer. Reads are refused once the backlog between mark-delete
    /// and read position reaches this bound.
    pub max_unacked_messages_per_subscription: usize,

    /// Apply dispatch rate limiting even to consumers that are fully caught
    /// up. When false, limiters only engage while the cursor is inactive.
    pub dispatch_throttling_on_non_backlog_consumer_enabled: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            subscription_type: SubscriptionType::KeyShared,
            read_batch_size: DEFAULT_READ_BATCH_SIZE,
            max_unacked_messages_per_consumer: DEFAULT_MAX_UNACKED_MESSAGES_PER_CONSUMER,
            max_unacked_messages_per_subscription: DEFAULT_MAX_UNACKED_MESSAGES_PER_SUBSCRIPTION,
            dispatch_throttling_on_non_backlog_consumer_enabled: false,
        }
    }
}

impl SubscriptionConfig {
    /// Validate field consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.read_batch_size == 0 {
            return Err("read_batch_size must be at least 1".to_string());
        }
        if self.max_unacked_messages_per_subscription < self.max_unacked_messages_per_consumer {
            return Err(
                "max_unacked_messages_per_subscription must be >= max_unacked_messages_per_consumer"
                    .to_string(),
            );
        }
        Ok(())
    }
}
