//! Tests for the ingress source against a live subscription cursor.
//!
//! The in-memory cursor plays the acknowledgement sink, so these verify the
//! actual mark-delete movement each guarantee produces, not just which
//! method was called.

use bytes::Bytes;
use std::sync::Arc;

use keyshared::cursor::{Acknowledger, ManagedCursor, MemoryCursor};
use keyshared::source::{
    ProcessingGuarantee, SourceConfig, SourceError, SubscriptionSource, TopicResolver, TopicSpec,
};
use keyshared::types::Position;

struct PrefixResolver;

impl TopicResolver for PrefixResolver {
    fn expand(&self, pattern: &str) -> Vec<String> {
        let prefix = pattern.trim_end_matches(".*");
        vec![format!("{}red", prefix), format!("{}blue", prefix)]
    }
}

fn config(guarantee: ProcessingGuarantee) -> SourceConfig {
    let mut config = SourceConfig::single_topic("ingest-sub", "orders");
    config.processing_guarantees = guarantee;
    config
}

async fn feed(
    source: &SubscriptionSource,
    cursor: &Arc<MemoryCursor>,
    position: Position,
    body: &'static [u8],
) {
    source
        .received(
            "orders",
            None,
            position,
            Bytes::from_static(body),
            Arc::clone(cursor) as Arc<dyn Acknowledger>,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_at_least_once_ack_moves_mark_delete_contiguously() {
    let cursor = Arc::new(MemoryCursor::new(1));
    let p0 = cursor.append(Bytes::from_static(b"a"));
    let p1 = cursor.append(Bytes::from_static(b"b"));

    let source = SubscriptionSource::new(config(ProcessingGuarantee::AtLeastOnce));
    feed(&source, &cursor, p0, b"a").await;
    feed(&source, &cursor, p1, b"b").await;

    let record0 = source.read().await.unwrap();
    let record1 = source.read().await.unwrap();
    assert_eq!(record0.position(), p0);
    assert_eq!(record1.position(), p1);

    // Ack out of order: an individual ack past a hole does not move the mark.
    record1.ack();
    assert_eq!(cursor.mark_delete_position(), Position::new(1, -1));

    record0.ack();
    assert_eq!(cursor.mark_delete_position(), p1);
}

#[tokio::test]
async fn test_effectively_once_ack_is_cumulative() {
    let cursor = Arc::new(MemoryCursor::new(1));
    for _ in 0..3 {
        cursor.append(Bytes::from_static(b"m"));
    }

    let source = SubscriptionSource::new(config(ProcessingGuarantee::EffectivelyOnce));
    feed(&source, &cursor, Position::new(1, 2), b"m").await;

    // One cumulative ack commits everything up to the record.
    source.read().await.unwrap().ack();
    assert_eq!(cursor.mark_delete_position(), Position::new(1, 2));
}

#[tokio::test]
async fn test_fail_under_effectively_once_escalates() {
    let cursor = Arc::new(MemoryCursor::new(1));
    let p0 = cursor.append(Bytes::from_static(b"m"));

    let source = SubscriptionSource::new(config(ProcessingGuarantee::EffectivelyOnce));
    feed(&source, &cursor, p0, b"m").await;

    let record = source.read().await.unwrap();
    let err = record.fail().unwrap_err();
    assert_eq!(
        err,
        SourceError::ProcessingFailed {
            topic: "orders".to_string(),
            position: p0,
        }
    );
    // Nothing was acknowledged.
    assert_eq!(cursor.mark_delete_position(), Position::new(1, -1));
}

#[tokio::test]
async fn test_fail_under_weaker_guarantees_is_noop() {
    let cursor = Arc::new(MemoryCursor::new(1));
    let p0 = cursor.append(Bytes::from_static(b"m"));

    let source = SubscriptionSource::new(config(ProcessingGuarantee::AtLeastOnce));
    feed(&source, &cursor, p0, b"m").await;

    let record = source.read().await.unwrap();
    assert!(record.fail().is_ok());
    // Unacknowledged: the broker's unack timeout will redeliver it.
    assert_eq!(cursor.mark_delete_position(), Position::new(1, -1));
}

#[tokio::test]
async fn test_multi_topic_envelope_names_the_record() {
    let cursor = Arc::new(MemoryCursor::new(1));
    let source = SubscriptionSource::new(config(ProcessingGuarantee::AtLeastOnce));

    source
        .received(
            "orders",
            Some("orders-eu"),
            Position::new(1, 0),
            Bytes::from_static(b"m"),
            Arc::clone(&cursor) as Arc<dyn Acknowledger>,
        )
        .await
        .unwrap();

    assert_eq!(source.read().await.unwrap().topic(), "orders-eu");
}

#[test]
fn test_input_topics_expand_patterns() {
    let config = SourceConfig {
        subscription_name: "ingest-sub".to_string(),
        topics: vec![
            TopicSpec::literal("orders"),
            TopicSpec::pattern("events-.*"),
        ],
        processing_guarantees: ProcessingGuarantee::AtLeastOnce,
        queue_capacity: 8,
    };
    let source = SubscriptionSource::new(config);
    source.open(&PrefixResolver);

    assert_eq!(
        source.input_topics(),
        vec!["orders", "events-red", "events-blue"]
    );
}
