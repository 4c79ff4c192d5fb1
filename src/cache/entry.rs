//! Cache Entry Module
//!
//! Defines the envelope wrapped around every stored value. The envelope
//! carries the expiry so the client can enforce TTL even when a backend
//! keeps an entry past its deadline.
//!
//! Byte layout (big endian):
//! `[version:u8][created_at_ms:u64][expires_at_ms:u64, 0 = never][payload...]`

use chrono::Utc;

use crate::error::{CacheError, Result};

const ENVELOPE_VERSION: u8 = 1;
/// Size of the fixed envelope header in bytes.
pub const HEADER_LEN: usize = 1 + 8 + 8;

// == Cache Entry ==
/// A single stored value with its timing metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Codec-tagged payload bytes
    pub value: Vec<u8>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry expiring `ttl_seconds` from now.
    ///
    /// # Arguments
    /// * `value` - Encoded payload
    /// * `ttl_seconds` - Optional TTL in seconds, None = never expires
    pub fn new(value: Vec<u8>, ttl_seconds: Option<u64>) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl_seconds.map(|ttl| now.saturating_add(ttl.saturating_mul(1000)));

        Self {
            value,
            created_at: now,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches `expires_at`, so it is
    /// visible only while `now < expires_at`.
    pub fn is_expired(&self) -> bool {
        is_past(self.expires_at)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }

    // == Encode ==
    /// Serializes the entry into its stored byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.value.len());
        buf.push(ENVELOPE_VERSION);
        buf.extend_from_slice(&self.created_at.to_be_bytes());
        buf.extend_from_slice(&self.expires_at.unwrap_or(0).to_be_bytes());
        buf.extend_from_slice(&self.value);
        buf
    }

    // == Decode ==
    /// Parses an entry from stored bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = EnvelopeHeader::parse(bytes)?;
        Ok(Self {
            value: bytes[HEADER_LEN..].to_vec(),
            created_at: header.created_at,
            expires_at: header.expires_at,
        })
    }
}

// == Envelope Header ==
/// The fixed-size prefix of a stored entry. Parsing it never touches the
/// payload, which lets existence checks skip decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub created_at: u64,
    pub expires_at: Option<u64>,
}

impl EnvelopeHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CacheError::Serialization(format!(
                "stored entry truncated: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != ENVELOPE_VERSION {
            return Err(CacheError::Serialization(format!(
                "unsupported entry version {}",
                bytes[0]
            )));
        }

        let created_at = read_u64(&bytes[1..9]);
        let expires_at = match read_u64(&bytes[9..17]) {
            0 => None,
            ts => Some(ts),
        };

        Ok(Self {
            created_at,
            expires_at,
        })
    }

    pub fn is_expired(&self) -> bool {
        is_past(self.expires_at)
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_be_bytes(raw)
}

fn is_past(expires_at: Option<u64>) -> bool {
    match expires_at {
        Some(expires) => current_timestamp_ms() >= expires,
        None => false,
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
