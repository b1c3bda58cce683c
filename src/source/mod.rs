//! Ingress source connector.
//!
//! A pluggable source feeds externally produced records into the topic.
//! For each arriving message the connector builds a [`SourceRecord`]
//! carrying the payload, the resolved topic name, and acknowledgement
//! hooks bound to the subscription cursor.
//!
//! Acknowledgement mode follows the configured [`ProcessingGuarantee`]:
//! effectively-once acknowledges cumulatively (everything up to the record),
//! the weaker guarantees acknowledge individually. Failing a record under
//! effectively-once is fatal; under the weaker guarantees it is a no-op and
//! the broker's unacknowledged-message timeout redelivers.

mod push;
mod record;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use push::{SourceConfig, SubscriptionSource, TopicResolver, TopicSpec};
pub use record::SourceRecord;

use crate::types::Position;

/// How strictly the host processes each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessingGuarantee {
    /// Records may be lost on failure; never processed twice.
    AtMostOnce,
    /// Records may be processed more than once; never lost.
    #[default]
    AtLeastOnce,
    /// Records are processed exactly once from the topic's point of view.
    /// Requires cumulative acknowledgement and makes failure fatal.
    EffectivelyOnce,
}

impl std::str::FromStr for ProcessingGuarantee {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "atmostonce" | "at_most_once" => Ok(ProcessingGuarantee::AtMostOnce),
            "atleastonce" | "at_least_once" => Ok(ProcessingGuarantee::AtLeastOnce),
            "effectivelyonce" | "effectively_once" => Ok(ProcessingGuarantee::EffectivelyOnce),
            _ => Err(format!(
                "Unknown processing guarantee '{}'. Valid: at_most_once, at_least_once, effectively_once",
                s
            )),
        }
    }
}

impl std::fmt::Display for ProcessingGuarantee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingGuarantee::AtMostOnce => write!(f, "at_most_once"),
            ProcessingGuarantee::AtLeastOnce => write!(f, "at_least_once"),
            ProcessingGuarantee::EffectivelyOnce => write!(f, "effectively_once"),
        }
    }
}

/// Errors surfaced by the ingress source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// A record failed under effectively-once: its progress halts and the
    /// error escalates to the surrounding process.
    #[error("Failed to process message {position} on topic '{topic}'")]
    ProcessingFailed {
        /// Topic the record came from.
        topic: String,
        /// Log coordinate of the failed record.
        position: Position,
    },

    /// The source was closed; no further records flow.
    #[error("Source is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarantee_from_str() {
        assert_eq!(
            "effectively-once".parse::<ProcessingGuarantee>().unwrap(),
            ProcessingGuarantee::EffectivelyOnce
        );
        assert_eq!(
            "AT_LEAST_ONCE".parse::<ProcessingGuarantee>().unwrap(),
            ProcessingGuarantee::AtLeastOnce
        );
        assert_eq!(
            "atmostonce".parse::<ProcessingGuarantee>().unwrap(),
            ProcessingGuarantee::AtMostOnce
        );
        assert!("exactly_twice".parse::<ProcessingGuarantee>().is_err());
    }

    #[test]
    fn test_guarantee_display_round_trips() {
        for guarantee in [
            ProcessingGuarantee::AtMostOnce,
            ProcessingGuarantee::AtLeastOnce,
            ProcessingGuarantee::EffectivelyOnce,
        ] {
            let parsed: ProcessingGuarantee = guarantee.to_string().parse().unwrap();
            assert_eq!(parsed, guarantee);
        }
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::ProcessingFailed {
            topic: "orders".to_string(),
            position: Position::new(1, 5),
        };
        assert!(err.to_string().contains("orders"));
        assert!(err.to_string().contains("1:5"));
    }
}
