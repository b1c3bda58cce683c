//! Log entries and sticky-key extraction.
//!
//! An [`Entry`] pairs a log [`Position`] with its payload buffer. The
//! payload starts with a length-prefixed routing key:
//!
//! ```text
//! +----------------+-----------------+-----------------------+
//! | key length u16 | key (key bytes) | message body ...      |
//! +----------------+-----------------+-----------------------+
//! ```
//!
//! [`Entry::peek_sticky_key`] reads the key without consuming the buffer.
//! Entries whose header is missing, empty, or malformed route through the
//! fixed [`NONE_KEY`](crate::constants::NONE_KEY) so keyless traffic still
//! lands on a single consumer in order.
//!
//! Each entry is owned by exactly one party at a time: the dispatcher hands
//! it to a consumer transport or drops it (releasing the underlying buffer)
//! after parking its position in the redelivery set.

use bytes::Bytes;
use nom::{IResult, bytes::complete::take, number::complete::be_u16};
use nombytes::NomBytes;

use crate::constants::{MAX_STICKY_KEY_SIZE, NONE_KEY, STICKY_KEY_LENGTH_PREFIX};
use crate::types::Position;

/// A single record read from the durable log.
#[derive(Debug, Clone)]
pub struct Entry {
    position: Position,
    payload: Bytes,
}

impl Entry {
    /// Create an entry from a position and an already-framed payload.
    pub fn new(position: Position, payload: Bytes) -> Self {
        Self { position, payload }
    }

    /// The entry's log coordinate.
    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    /// The full framed payload (key header included).
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload size in bytes, as charged against byte rate limits.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Extract the sticky key without consuming the payload.
    ///
    /// Falls back to [`NONE_KEY`](crate::constants::NONE_KEY) when the
    /// header is absent, empty, or claims an implausible key length.
    pub fn peek_sticky_key(&self) -> Bytes {
        peek_sticky_key(&self.payload)
    }

    /// The message body after the key header, when the header parses.
    pub fn body(&self) -> Bytes {
        match parse_key_header(NomBytes::from(self.payload.as_ref())) {
            Ok((rest, key)) if !key.is_empty() && key.len() <= MAX_STICKY_KEY_SIZE => {
                rest.into_bytes()
            }
            _ => self.payload.clone(),
        }
    }
}

fn parse_key_header(input: NomBytes) -> IResult<NomBytes, Bytes> {
    let (input, length) = be_u16(input)?;
    let (input, key) = take(length)(input)?;
    Ok((input, key.into_bytes()))
}

/// Peek the sticky key out of a framed payload.
pub fn peek_sticky_key(payload: &Bytes) -> Bytes {
    match parse_key_header(NomBytes::from(payload.as_ref())) {
        Ok((_, key)) if !key.is_empty() && key.len() <= MAX_STICKY_KEY_SIZE => key,
        _ => Bytes::from_static(NONE_KEY),
    }
}

/// Frame a message body with its sticky key.
///
/// Inverse of [`peek_sticky_key`]; producers and test fixtures use this to
/// build payloads the dispatcher can route.
pub fn encode_keyed_payload(key: &[u8], body: &[u8]) -> Bytes {
    debug_assert!(key.len() <= u16::MAX as usize);
    let mut buf = Vec::with_capacity(STICKY_KEY_LENGTH_PREFIX + key.len() + body.len());
    buf.extend_from_slice(&(key.len() as u16).to_be_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(body);
    Bytes::from(buf)
}
