//! Crate-level errors.
//!
//! The crate uses a two-layer error hierarchy:
//!
//! - [`Error`]: top-level errors surfaced to the subscription host.
//! - Layer errors below it: [`CursorError`](crate::cursor::CursorError) for
//!   the managed-log read path, [`SendError`](crate::dispatch::SendError)
//!   for the consumer transport, and
//!   [`SourceError`](crate::source::SourceError) for the ingress connector.
//!
//! Layer errors convert into [`Error`] via `From`, so `?` propagates them
//! through host-facing entry points. Inside the dispatch loop itself almost
//! nothing escalates: transient cursor errors pause reading, send failures
//! are left to the transport's unacknowledged-message timeout, and permit
//! exhaustion is deferral, not failure.

use std::result;
use thiserror::Error as ThisError;

use crate::cursor::CursorError;
use crate::dispatch::SendError;
use crate::source::SourceError;

pub type Result<T> = result::Result<T, Error>;

/// Top-level error for subscription hosts.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The managed-log cursor failed.
    #[error(transparent)]
    Cursor(#[from] CursorError),

    /// A consumer transport send failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// The ingress source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
