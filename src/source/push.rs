//! Push-style source over one subscription.
//!
//! [`SubscriptionSource`] sits between the broker consumer callback and the
//! processing host: [`received`](SubscriptionSource::received) wraps each
//! arriving message into a [`SourceRecord`] and queues it;
//! [`read`](SubscriptionSource::read) drains the queue. The source also
//! tracks its input topics, expanding pattern subscriptions through a
//! [`TopicResolver`], so hosts can introspect what is actually being
//! consumed.

use bytes::Bytes;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::{Mutex, mpsc};
use tracing::info;

use super::record::SourceRecord;
use super::{ProcessingGuarantee, SourceError};
use crate::constants::DEFAULT_SOURCE_QUEUE_CAPACITY;
use crate::cursor::Acknowledger;
use crate::types::Position;

/// One subscribed topic, literal or pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    /// Topic name or pattern.
    pub name: String,
    /// Whether `name` is a pattern to expand at open time.
    pub is_pattern: bool,
}

impl TopicSpec {
    /// A literal topic.
    pub fn literal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_pattern: false,
        }
    }

    /// A pattern subscription.
    pub fn pattern(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_pattern: true,
        }
    }
}

/// Expands a topic pattern to the topics it currently matches.
pub trait TopicResolver {
    /// Topics matching `pattern` right now.
    fn expand(&self, pattern: &str) -> Vec<String>;
}

/// Source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Subscription name the source consumes through.
    pub subscription_name: String,
    /// Input topics, literal or pattern.
    pub topics: Vec<TopicSpec>,
    /// Processing guarantee for every record.
    pub processing_guarantees: ProcessingGuarantee,
    /// Capacity of the internal record queue.
    pub queue_capacity: usize,
}

impl SourceConfig {
    /// A single-topic source with the default guarantee and queue size.
    pub fn single_topic(
        subscription_name: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            subscription_name: subscription_name.into(),
            topics: vec![TopicSpec::literal(topic)],
            processing_guarantees: ProcessingGuarantee::default(),
            queue_capacity: DEFAULT_SOURCE_QUEUE_CAPACITY,
        }
    }
}

/// A push source delivering externally produced records into the host.
pub struct SubscriptionSource {
    config: SourceConfig,
    tx: mpsc::Sender<SourceRecord>,
    rx: Mutex<mpsc::Receiver<SourceRecord>>,
    input_topics: RwLock<Vec<String>>,
}

impl SubscriptionSource {
    /// Create a source for `config`. Call [`open`](Self::open) before
    /// feeding records.
    pub fn new(config: SourceConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            tx,
            rx: Mutex::new(rx),
            input_topics: RwLock::new(Vec::new()),
        }
    }

    /// Resolve the configured topics and record the expanded input list.
    pub fn open<R: TopicResolver>(&self, resolver: &R) {
        let mut topics = Vec::new();
        for spec in &self.config.topics {
            if spec.is_pattern {
                topics.extend(resolver.expand(&spec.name));
            } else {
                topics.push(spec.name.clone());
            }
        }
        info!(
            subscription = %self.config.subscription_name,
            topics = topics.len(),
            "source opened"
        );
        *self.input_topics.write().expect("input topics lock poisoned") = topics;
    }

    /// The expanded list of topics this source consumes.
    pub fn input_topics(&self) -> Vec<String> {
        self.input_topics
            .read()
            .expect("input topics lock poisoned")
            .clone()
    }

    /// The configured processing guarantee.
    pub fn processing_guarantees(&self) -> ProcessingGuarantee {
        self.config.processing_guarantees
    }

    /// Handle one arriving message.
    ///
    /// `envelope_topic` is the per-message topic from a multi-topic
    /// envelope; without one, the record carries `consumer_topic` (the
    /// single topic the subscription consumes). The built record is queued
    /// for [`read`](Self::read); this applies backpressure when the queue
    /// is full.
    pub async fn received(
        &self,
        consumer_topic: &str,
        envelope_topic: Option<&str>,
        position: Position,
        payload: Bytes,
        acker: Arc<dyn Acknowledger>,
    ) -> Result<(), SourceError> {
        let topic = envelope_topic.unwrap_or(consumer_topic);
        let record = SourceRecord::new(
            payload,
            topic,
            position,
            self.config.processing_guarantees,
            acker,
        );
        self.tx.send(record).await.map_err(|_| SourceError::Closed)
    }

    /// Next queued record, or `None` once the source is closed and drained.
    pub async fn read(&self) -> Option<SourceRecord> {
        self.rx.lock().await.recv().await
    }

    /// Stop accepting records. Already-queued records remain readable.
    pub async fn close(&self) {
        self.rx.lock().await.close();
        info!(subscription = %self.config.subscription_name, "source closed");
    }
}
