//! Verdict extraction from verifier responses.
//!
//! Verifier APIs in this space disagree on field names, nesting, and whether
//! amounts are numbers or strings. Extraction probes an ordered list of key
//! candidates at the response root and under `data`, and accepts either
//! numeric form. An unparseable body degrades to a failed verdict rather
//! than an error.

use serde_json::Value;

/// Error code meaning the slip was already submitted.
pub const DUPLICATE_CODE: i64 = 1012;

const AMOUNT_KEYS: &[&str] = &["amount", "amt", "paid_amount", "paidAmount", "value"];
const MESSAGE_KEYS: &[&str] = &["message", "msg", "statusMessage"];
const REF_KEYS: &[&str] = &["transRef", "trans_ref", "ref", "reference"];
const SENDER_KEYS: &[&str] = &["sendingBank", "sending_bank", "senderBank"];
const RECEIVER_KEYS: &[&str] = &["receivingBank", "receiving_bank", "receiverBank"];
const TIMESTAMP_KEYS: &[&str] = &["transDate", "transTimestamp", "transacted_at", "date"];

/// Outcome of one slip verification call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    /// The verifier confirmed a real transfer.
    pub ok: bool,
    /// The same slip was submitted before.
    pub duplicate: bool,
    /// Transferred amount as reported by the verifier.
    pub amount: Option<f64>,
    /// Human-readable verifier message, passed through to the user.
    pub message: Option<String>,
    pub trans_ref: Option<String>,
    pub sender_bank: Option<String>,
    pub receiver_bank: Option<String>,
    pub transacted_at: Option<String>,
}

/// Build a verdict from the HTTP outcome and (possibly empty) JSON body.
#[must_use]
pub fn extract_verdict(http_ok: bool, body: &Value) -> Verdict {
    let duplicate = first_i64(body, &["code"]) == Some(DUPLICATE_CODE);
    let message = first_string(body, MESSAGE_KEYS);
    // The raw `success` flag is deliberately ignored: some verifier
    // deployments set it on failure responses. Only the message text counts.
    let ok = http_ok && !duplicate && message.as_deref().is_some_and(message_indicates_success);

    Verdict {
        ok,
        duplicate,
        amount: first_amount(body, AMOUNT_KEYS),
        message,
        trans_ref: first_string(body, REF_KEYS),
        sender_bank: first_string(body, SENDER_KEYS),
        receiver_bank: first_string(body, RECEIVER_KEYS),
        transacted_at: first_string(body, TIMESTAMP_KEYS),
    }
}

fn message_indicates_success(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("success") || lower.contains("สำเร็จ") || lower.trim() == "ok"
}

/// Probe `keys` in order at the root, then under `data`.
fn first_value<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    for scope in [Some(body), body.get("data")] {
        let scope = scope?;
        for key in keys {
            match scope.get(key) {
                Some(Value::Null) | None => {},
                Some(found) => return Some(found),
            }
        }
    }
    None
}

fn first_string(body: &Value, keys: &[&str]) -> Option<String> {
    match first_value(body, keys)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn first_i64(body: &Value, keys: &[&str]) -> Option<i64> {
    match first_value(body, keys)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn first_amount(body: &Value, keys: &[&str]) -> Option<f64> {
    match first_value(body, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}
