// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned envelope for durable conversation records.
//!
//! A record is only ever accepted whole: matching schema version, matching
//! owner, and within the retention window. Anything else is discarded, never
//! partially trusted. Payloads above the compression threshold are gzipped
//! and base64-encoded, marked with a textual prefix.

use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use convoy_core::ConvoyError;

/// Current schema version for durable records.
pub const STATE_VERSION: u32 = 1;

/// Prefix marking a compressed payload.
pub const COMPRESSED_PREFIX: &str = "gz:";

/// Durable form of one user's conversation state.
///
/// The state itself stays a loose JSON value until it has passed validation
/// (and possibly sanitization); typing it earlier would silently drop the
/// malformed fields validation exists to catch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedState {
    pub version: u32,
    pub user_id: String,
    pub state: serde_json::Value,
    /// Save time, epoch milliseconds.
    pub saved_at: i64,
}

impl VersionedState {
    /// Checks version, ownership, and freshness against the requesting user.
    ///
    /// Returns the reason for rejection, if any.
    pub fn acceptance_error(
        &self,
        requesting_user: &str,
        retention_ms: i64,
        now_ms: i64,
    ) -> Option<String> {
        if self.version != STATE_VERSION {
            return Some(format!(
                "schema version {} does not match current {STATE_VERSION}",
                self.version
            ));
        }
        if self.user_id != requesting_user {
            return Some("record owner does not match requesting user".to_string());
        }
        if now_ms.saturating_sub(self.saved_at) > retention_ms {
            return Some(format!(
                "record is older than the retention ceiling ({retention_ms}ms)"
            ));
        }
        None
    }
}

/// Compresses `payload` if it exceeds `threshold` bytes, otherwise returns it
/// unchanged.
pub fn encode_payload(payload: &str, threshold: usize) -> Result<String, ConvoyError> {
    if payload.len() <= threshold {
        return Ok(payload.to_string());
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload.as_bytes())
        .and_then(|_| encoder.finish())
        .map(|compressed| {
            let encoded = base64::engine::general_purpose::STANDARD.encode(compressed);
            format!("{COMPRESSED_PREFIX}{encoded}")
        })
        .map_err(|e| ConvoyError::Storage { source: Box::new(e) })
}

/// Reverses [`encode_payload`], detecting the compression marker.
pub fn decode_payload(raw: &str) -> Result<String, ConvoyError> {
    let Some(encoded) = raw.strip_prefix(COMPRESSED_PREFIX) else {
        return Ok(raw.to_string());
    };

    let compressed = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ConvoyError::Validation(format!("corrupt compressed payload: {e}")))?;

    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut out = String::new();
    decoder
        .read_to_string(&mut out)
        .map_err(|e| ConvoyError::Validation(format!("corrupt compressed payload: {e}")))?;
    Ok(out)
}
