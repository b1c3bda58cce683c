//! The record envelope handed to the processing host.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use super::{ProcessingGuarantee, SourceError};
use crate::cursor::Acknowledger;
use crate::types::Position;

/// One externally produced message, ready for processing.
///
/// The record owns its acknowledgement: [`ack`](Self::ack) and
/// [`fail`](Self::fail) are bound to the subscription cursor and the
/// configured processing guarantee at construction time.
pub struct SourceRecord {
    payload: Bytes,
    topic: String,
    position: Position,
    guarantee: ProcessingGuarantee,
    acker: Arc<dyn Acknowledger>,
}

impl SourceRecord {
    /// Build a record bound to `acker` under `guarantee`.
    pub fn new(
        payload: Bytes,
        topic: impl Into<String>,
        position: Position,
        guarantee: ProcessingGuarantee,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            payload,
            topic: topic.into(),
            position,
            guarantee,
            acker,
        }
    }

    /// The message payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The topic this record came from.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Log coordinate of the record.
    pub fn position(&self) -> Position {
        self.position
    }

    /// The guarantee this record is processed under.
    pub fn guarantee(&self) -> ProcessingGuarantee {
        self.guarantee
    }

    /// Acknowledge successful processing.
    ///
    /// Effectively-once acknowledges cumulatively, committing everything up
    /// to this record in one step; the weaker guarantees acknowledge just
    /// this position.
    pub fn ack(&self) {
        match self.guarantee {
            ProcessingGuarantee::EffectivelyOnce => self.acker.ack_cumulative(self.position),
            _ => self.acker.ack_individual(self.position),
        }
    }

    /// Report failed processing.
    ///
    /// Fatal under effectively-once: the record's progress halts and the
    /// error must escalate. Under weaker guarantees this is a no-op; the
    /// broker's unacknowledged-message timeout redelivers the message.
    pub fn fail(&self) -> Result<(), SourceError> {
        match self.guarantee {
            ProcessingGuarantee::EffectivelyOnce => Err(SourceError::ProcessingFailed {
                topic: self.topic.clone(),
                position: self.position,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for SourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRecord")
            .field("topic", &self.topic)
            .field("position", &self.position)
            .field("guarantee", &self.guarantee)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAcker {
        individual: Mutex<Vec<Position>>,
        cumulative: Mutex<Vec<Position>>,
    }

    impl Acknowledger for RecordingAcker {
        fn ack_individual(&self, position: Position) {
            self.individual.lock().unwrap().push(position);
        }

        fn ack_cumulative(&self, position: Position) {
            self.cumulative.lock().unwrap().push(position);
        }
    }

    fn record(guarantee: ProcessingGuarantee, acker: Arc<RecordingAcker>) -> SourceRecord {
        SourceRecord::new(
            Bytes::from_static(b"payload"),
            "orders",
            Position::new(1, 3),
            guarantee,
            acker,
        )
    }

    #[test]
    fn test_at_least_once_acks_individually() {
        let acker = Arc::new(RecordingAcker::default());
        record(ProcessingGuarantee::AtLeastOnce, acker.clone()).ack();
        assert_eq!(*acker.individual.lock().unwrap(), vec![Position::new(1, 3)]);
        assert!(acker.cumulative.lock().unwrap().is_empty());
    }

    #[test]
    fn test_effectively_once_acks_cumulatively() {
        let acker = Arc::new(RecordingAcker::default());
        record(ProcessingGuarantee::EffectivelyOnce, acker.clone()).ack();
        assert_eq!(*acker.cumulative.lock().unwrap(), vec![Position::new(1, 3)]);
        assert!(acker.individual.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fail_is_fatal_only_under_effectively_once() {
        let acker = Arc::new(RecordingAcker::default());
        assert!(
            record(ProcessingGuarantee::AtLeastOnce, acker.clone())
                .fail()
                .is_ok()
        );
        assert!(
            record(ProcessingGuarantee::AtMostOnce, acker.clone())
                .fail()
                .is_ok()
        );
        let err = record(ProcessingGuarantee::EffectivelyOnce, acker)
            .fail()
            .unwrap_err();
        assert!(matches!(err, SourceError::ProcessingFailed { .. }));
    }

    #[test]
    fn test_record_accessors() {
        let acker = Arc::new(RecordingAcker::default());
        let record = record(ProcessingGuarantee::AtLeastOnce, acker);
        assert_eq!(record.topic(), "orders");
        assert_eq!(record.position(), Position::new(1, 3));
        assert_eq!(record.payload().as_ref(), b"payload");
        assert_eq!(record.guarantee(), ProcessingGuarantee::AtLeastOnce);
    }
}
