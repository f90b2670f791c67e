// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The state recovery manager.
//!
//! Persists one user's [`ConversationState`] across a layered storage
//! hierarchy and recovers the best available version after a reload or crash.
//! Recovery strategies are tried in priority order — durable tier, volatile
//! tier, remote persistence (stub), in-memory last-known-good — and every
//! candidate is validated, sanitized if needed, and revalidated before it is
//! trusted. Exhausting all strategies yields a fresh state, never an error.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use convoy_config::model::RecoveryConfig;
use convoy_core::types::now_millis;
use convoy_core::{ConversationState, ConvoyError, StateStore, UserComponent};

use crate::envelope::{decode_payload, encode_payload, VersionedState, STATE_VERSION};
use crate::validate::{sanitize_state, validate_state};

/// Persists, validates, sanitizes, and restores one user's conversation state.
pub struct RecoveryManager {
    user_id: String,
    durable: Arc<dyn StateStore>,
    volatile: Arc<dyn StateStore>,
    config: RecoveryConfig,
    /// Last state that was successfully persisted; final fallback strategy.
    last_good: Mutex<Option<ConversationState>>,
}

impl RecoveryManager {
    pub fn new(
        user_id: impl Into<String>,
        durable: Arc<dyn StateStore>,
        volatile: Arc<dyn StateStore>,
        config: RecoveryConfig,
    ) -> Self {
        let user_id = user_id.into();
        info!(user_id = %user_id, "recovery manager created");
        Self {
            user_id,
            durable,
            volatile,
            config,
            last_good: Mutex::new(None),
        }
    }

    fn storage_key(&self) -> String {
        format!("convoy:conversation:{}", self.user_id)
    }

    fn retention_ms(&self) -> i64 {
        (self.config.retention_hours as i64).saturating_mul(3_600_000)
    }

    /// Persists the state: validate, envelope, size-check, compress, write
    /// durable then volatile, update the last-known-good snapshot.
    ///
    /// Known-bad state is never persisted; oversized state is refused with a
    /// capacity error. The volatile tier is best-effort: its failure alone
    /// does not fail the save.
    pub async fn save_state(&self, state: &ConversationState) -> Result<(), ConvoyError> {
        let value = serde_json::to_value(state)
            .map_err(|e| ConvoyError::Internal(format!("state serialization failed: {e}")))?;
        validate_state(&value, self.config.max_messages)?;

        let envelope = VersionedState {
            version: STATE_VERSION,
            user_id: self.user_id.clone(),
            state: value,
            saved_at: now_millis(),
        };
        let serialized = serde_json::to_string(&envelope)
            .map_err(|e| ConvoyError::Internal(format!("envelope serialization failed: {e}")))?;

        if serialized.len() > self.config.max_state_bytes {
            warn!(
                user_id = %self.user_id,
                size = serialized.len(),
                limit = self.config.max_state_bytes,
                "refusing to persist oversized state"
            );
            return Err(ConvoyError::Capacity {
                size: serialized.len(),
                limit: self.config.max_state_bytes,
            });
        }

        let payload = encode_payload(&serialized, self.config.compress_threshold_bytes)?;
        let key = self.storage_key();

        let durable_result = self.durable.put(&key, &payload).await;
        if let Err(e) = &durable_result {
            warn!(user_id = %self.user_id, error = %e, "durable tier write failed");
        }

        let volatile_result = self.volatile.put(&key, &payload).await;
        if let Err(e) = &volatile_result {
            warn!(
                user_id = %self.user_id,
                error = %e,
                "volatile tier write failed (best-effort)"
            );
        }

        // The save counts as long as at least one tier holds the record.
        if durable_result.is_err() && volatile_result.is_err() {
            return durable_result;
        }

        *self.last_good.lock().await = Some(state.clone());
        debug!(
            user_id = %self.user_id,
            bytes = payload.len(),
            messages = state.messages.len(),
            "state persisted"
        );
        Ok(())
    }

    /// Recovers the best available state, or a fresh one.
    ///
    /// Never returns an error: every strategy failure cascades to the next,
    /// and the final fallback is an empty conversation.
    pub async fn recover_state(&self) -> ConversationState {
        let key = self.storage_key();

        for (tier, store) in [("durable", &self.durable), ("volatile", &self.volatile)] {
            match store.get(&key).await {
                Ok(Some(raw)) => {
                    if let Some(state) = self.try_recover_candidate(&raw, tier) {
                        info!(user_id = %self.user_id, tier, "state recovered");
                        return state;
                    }
                }
                Ok(None) => debug!(user_id = %self.user_id, tier, "no record in tier"),
                Err(e) => warn!(user_id = %self.user_id, tier, error = %e, "tier read failed"),
            }
        }

        if let Some(state) = self.recover_from_remote().await {
            return state;
        }

        if let Some(state) = self.last_good.lock().await.clone() {
            info!(user_id = %self.user_id, "recovered from in-memory snapshot");
            return state;
        }

        info!(user_id = %self.user_id, "no recoverable state, starting fresh");
        ConversationState::default()
    }

    /// Remote persistence strategy.
    ///
    /// TODO: wire up to the server-side conversation archive once that API
    /// ships; until then this tier always misses.
    async fn recover_from_remote(&self) -> Option<ConversationState> {
        debug!(user_id = %self.user_id, "remote recovery tier not available");
        None
    }

    /// Decodes, checks, and validates one tier's record.
    fn try_recover_candidate(&self, raw: &str, tier: &str) -> Option<ConversationState> {
        let decoded = match decode_payload(raw) {
            Ok(d) => d,
            Err(e) => {
                warn!(user_id = %self.user_id, tier, error = %e, "undecodable record");
                return None;
            }
        };

        let envelope: VersionedState = match serde_json::from_str(&decoded) {
            Ok(env) => env,
            Err(e) => {
                warn!(user_id = %self.user_id, tier, error = %e, "unparseable envelope");
                return None;
            }
        };

        if let Some(reason) =
            envelope.acceptance_error(&self.user_id, self.retention_ms(), now_millis())
        {
            warn!(user_id = %self.user_id, tier, reason = %reason, "envelope rejected");
            return None;
        }

        self.accept_candidate(envelope.state, tier)
    }

    /// Validates a candidate state value, attempting a sanitize pass if the
    /// raw value fails. Both paths must end in a state that validates.
    fn accept_candidate(&self, value: serde_json::Value, tier: &str) -> Option<ConversationState> {
        if validate_state(&value, self.config.max_messages).is_ok()
            && let Ok(state) = serde_json::from_value::<ConversationState>(value.clone())
        {
            return Some(state);
        }

        let cleaned = sanitize_state(&value, self.config.max_messages);
        match validate_state(&cleaned, self.config.max_messages) {
            Ok(()) => match serde_json::from_value::<ConversationState>(cleaned) {
                Ok(state) => {
                    warn!(
                        user_id = %self.user_id,
                        tier,
                        "candidate failed validation, recovered via sanitize"
                    );
                    Some(state)
                }
                Err(e) => {
                    warn!(user_id = %self.user_id, tier, error = %e, "sanitized state untypeable");
                    None
                }
            },
            Err(e) => {
                warn!(user_id = %self.user_id, tier, error = %e, "candidate unrecoverable");
                None
            }
        }
    }

    /// Removes both storage tiers and the in-memory snapshot. Idempotent.
    pub async fn clear_state(&self) -> Result<(), ConvoyError> {
        let key = self.storage_key();
        let durable_result = self.durable.remove(&key).await;
        if let Err(e) = self.volatile.remove(&key).await {
            warn!(user_id = %self.user_id, error = %e, "volatile tier clear failed");
        }
        *self.last_good.lock().await = None;
        debug!(user_id = %self.user_id, "state cleared");
        durable_result
    }
}

#[async_trait]
impl UserComponent for RecoveryManager {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Persists the last-known-good snapshot one final time before release.
    async fn dispose(&self) {
        let snapshot = self.last_good.lock().await.clone();
        if let Some(state) = snapshot
            && let Err(e) = self.save_state(&state).await
        {
            warn!(user_id = %self.user_id, error = %e, "final snapshot persist failed");
        }
        info!(user_id = %self.user_id, "recovery manager disposed");
    }
}
