// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validation and sanitization of recovered conversation state.
//!
//! Both operate on loose JSON so that malformed fields are visible instead of
//! being silently dropped by typed deserialization. Validation answers
//! "can this be trusted as-is"; sanitization salvages what it can — dropping
//! malformed messages, clamping future timestamps, coercing missing scalars
//! to safe defaults — after which the result must pass validation again
//! before anyone sees it.

use serde_json::Value;

use convoy_core::types::now_millis;
use convoy_core::ConvoyError;

const ALLOWED_ROLES: [&str; 3] = ["user", "assistant", "system"];
const ALLOWED_STATUSES: [&str; 5] = ["pending", "sending", "sent", "failed", "received"];

/// Validates a candidate conversation state.
///
/// Rules: the state must be an object; `messages` must be an array no longer
/// than `max_messages`; every message needs an id, an allowed role, and a
/// numeric creation timestamp no further in the future than `now`.
pub fn validate_state(state: &Value, max_messages: usize) -> Result<(), ConvoyError> {
    let obj = state
        .as_object()
        .ok_or_else(|| ConvoyError::Validation("state is not an object".to_string()))?;

    let messages = obj
        .get("messages")
        .and_then(|m| m.as_array())
        .ok_or_else(|| ConvoyError::Validation("messages is not an array".to_string()))?;

    if messages.len() > max_messages {
        return Err(ConvoyError::Validation(format!(
            "message count {} exceeds sanity ceiling {max_messages}",
            messages.len()
        )));
    }

    let now = now_millis();
    for (index, message) in messages.iter().enumerate() {
        validate_message(message, now)
            .map_err(|reason| ConvoyError::Validation(format!("message {index}: {reason}")))?;
    }

    Ok(())
}

fn validate_message(message: &Value, now: i64) -> Result<(), String> {
    let obj = message.as_object().ok_or("not an object")?;

    let id = obj.get("id").and_then(|v| v.as_str()).ok_or("missing id")?;
    if id.is_empty() {
        return Err("empty id".to_string());
    }

    let role = obj.get("role").and_then(|v| v.as_str()).ok_or("missing role")?;
    if !ALLOWED_ROLES.contains(&role) {
        return Err(format!("role {role:?} not in allowed set"));
    }

    let created_at = obj
        .get("created_at")
        .and_then(|v| v.as_i64())
        .ok_or("missing created_at")?;
    if created_at > now {
        return Err(format!("created_at {created_at} is in the future"));
    }

    Ok(())
}

/// Best-effort repair of a corrupted state.
///
/// Returns a new value; the input is never mutated. The result still has to
/// pass [`validate_state`] — sanitization that cannot produce a valid state
/// means the candidate is discarded.
pub fn sanitize_state(state: &Value, max_messages: usize) -> Value {
    let now = now_millis();
    let source = state.as_object().cloned().unwrap_or_default();

    let messages: Vec<Value> = source
        .get("messages")
        .and_then(|m| m.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|m| sanitize_message(m, now))
                .take(max_messages)
                .collect()
        })
        .unwrap_or_default();

    let mut out = serde_json::Map::new();
    out.insert("messages".to_string(), Value::Array(messages));
    out.insert(
        "thread_id".to_string(),
        source.get("thread_id").cloned().filter(Value::is_string).unwrap_or(Value::Null),
    );
    // An interrupted run cannot be resumed across recovery; drop the run
    // marker and the processing flag together.
    out.insert("active_run_id".to_string(), Value::Null);
    out.insert("is_processing".to_string(), Value::Bool(false));
    out.insert(
        "last_activity".to_string(),
        Value::from(
            source
                .get("last_activity")
                .and_then(|v| v.as_i64())
                .map(|t| t.min(now))
                .unwrap_or(now),
        ),
    );
    if let Some(uvs) = source.get("uvs_context").filter(|v| v.is_object()) {
        out.insert("uvs_context".to_string(), uvs.clone());
    }

    Value::Object(out)
}

fn sanitize_message(message: &Value, now: i64) -> Option<Value> {
    let obj = message.as_object()?;

    let id = obj.get("id")?.as_str().filter(|s| !s.is_empty())?;
    let role = obj.get("role")?.as_str().filter(|r| ALLOWED_ROLES.contains(r))?;
    let created_at = obj
        .get("created_at")
        .and_then(|v| v.as_i64())
        .map(|t| t.min(now))
        .unwrap_or(now);

    let status = obj
        .get("status")
        .and_then(|v| v.as_str())
        .filter(|s| ALLOWED_STATUSES.contains(s))
        .unwrap_or("received");

    let mut out = serde_json::Map::new();
    out.insert("id".to_string(), Value::from(id));
    out.insert("role".to_string(), Value::from(role));
    out.insert("created_at".to_string(), Value::from(created_at));
    out.insert("status".to_string(), Value::from(status));
    out.insert(
        "text".to_string(),
        Value::from(obj.get("text").and_then(|v| v.as_str()).unwrap_or_default()),
    );
    out.insert(
        "retries".to_string(),
        Value::from(obj.get("retries").and_then(|v| v.as_u64()).unwrap_or(0)),
    );
    if let Some(metadata) = obj.get("metadata").filter(|v| v.is_object()) {
        out.insert("metadata".to_string(), metadata.clone());
    }

    Some(Value::Object(out))
}
