//! Defensive field extraction over heterogeneous gateway payloads.
//!
//! The gateway's webhook body is not shape-stable: the same field shows up
//! as `TransactionReference`, `data.TransactionReference` or
//! `transaction_reference` depending on which integration path produced the
//! delivery. Each logical field gets an ordered alias table that is tried
//! in priority order, so the parsing rules stay testable in one place.

use serde_json::Value as JsonValue;

/// Ordered lookup table for one logical field.
pub struct FieldRule {
    pub name: &'static str,
    pub paths: &'static [&'static str],
}

pub const TRANSACTION_REFERENCE: FieldRule = FieldRule {
    name: "transaction_reference",
    paths: &[
        "TransactionReference",
        "transaction_reference",
        "data.TransactionReference",
        "data.transaction_reference",
        "CheckoutRequestID",
        "data.CheckoutRequestID",
        "data.reference",
        "reference",
    ],
};

pub const EXTERNAL_REFERENCE: FieldRule = FieldRule {
    name: "external_reference",
    paths: &[
        "external_reference",
        "ExternalReference",
        "data.external_reference",
        "data.ExternalReference",
        "AccountReference",
        "data.AccountReference",
        "metadata.external_reference",
        "data.metadata.external_reference",
        "metadata.order_id",
        "data.metadata.order_id",
    ],
};

pub const RESPONSE_CODE: FieldRule = FieldRule {
    name: "response_code",
    paths: &[
        "ResponseCode",
        "response_code",
        "data.ResponseCode",
        "data.response_code",
        "ResultCode",
        "data.ResultCode",
    ],
};

pub const RESPONSE_DESCRIPTION: FieldRule = FieldRule {
    name: "response_description",
    paths: &[
        "ResponseDescription",
        "response_description",
        "data.ResponseDescription",
        "data.response_description",
        "ResultDesc",
        "data.ResultDesc",
        "message",
        "data.message",
    ],
};

pub const SUCCESS: FieldRule = FieldRule {
    name: "success",
    paths: &["success", "data.success"],
};

pub const AMOUNT: FieldRule = FieldRule {
    name: "amount",
    paths: &["Amount", "amount", "data.Amount", "data.amount"],
};

pub const PHONE: FieldRule = FieldRule {
    name: "phone",
    paths: &[
        "PhoneNumber",
        "phone_number",
        "data.PhoneNumber",
        "data.phone_number",
        "msisdn",
        "data.msisdn",
    ],
};

/// First alias of `rule` present and non-null in `payload`.
pub fn lookup<'a>(payload: &'a JsonValue, rule: &FieldRule) -> Option<&'a JsonValue> {
    rule.paths.iter().find_map(|path| {
        let mut node = payload;
        for segment in path.split('.') {
            node = node.get(segment)?;
        }
        if node.is_null() {
            None
        } else {
            Some(node)
        }
    })
}

/// String form of a field, accepting strings and numbers.
pub fn lookup_string(payload: &JsonValue, rule: &FieldRule) -> Option<String> {
    match lookup(payload, rule)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer form of a field, accepting numbers and numeric strings.
pub fn lookup_int(payload: &JsonValue, rule: &FieldRule) -> Option<i64> {
    match lookup(payload, rule)? {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        JsonValue::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Fields the correlator needs from a callback delivery.
#[derive(Debug, Clone, Default)]
pub struct CallbackFields {
    pub transaction_reference: Option<String>,
    pub external_reference: Option<String>,
    pub response_code: Option<i64>,
    pub response_description: Option<String>,
    pub amount: Option<i64>,
    pub phone: Option<String>,
}

pub fn callback_fields(payload: &JsonValue) -> CallbackFields {
    CallbackFields {
        transaction_reference: lookup_string(payload, &TRANSACTION_REFERENCE),
        external_reference: lookup_string(payload, &EXTERNAL_REFERENCE),
        response_code: lookup_int(payload, &RESPONSE_CODE),
        response_description: lookup_string(payload, &RESPONSE_DESCRIPTION),
        amount: lookup_int(payload, &AMOUNT),
        phone: lookup_string(payload, &PHONE),
    }
}

/// Key used to match a callback to a prior payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationKey {
    /// Reference minted by the provider when the push was accepted.
    TransactionReference(String),
    /// Caller-supplied reference, typically an order id.
    ExternalReference(String),
}

/// Candidate correlation keys in lookup priority order: the provider's own
/// transaction reference outranks the caller-supplied external reference.
pub fn correlation_candidates(fields: &CallbackFields) -> Vec<CorrelationKey> {
    let mut candidates = Vec::new();
    if let Some(reference) = &fields.transaction_reference {
        candidates.push(CorrelationKey::TransactionReference(reference.clone()));
    }
    if let Some(reference) = &fields.external_reference {
        candidates.push(CorrelationKey::ExternalReference(reference.clone()));
    }
    candidates
}

/// Tri-source success signal for a callback: an explicit boolean, a zero
/// response code, or a "success" description. The webhook shape differs
/// between the gateway's documented schema and what its sandbox actually
/// sends, so no single source is authoritative.
pub fn success_flag(payload: &JsonValue) -> bool {
    let explicit = lookup(payload, &SUCCESS).and_then(JsonValue::as_bool) == Some(true);
    let code_zero = lookup_int(payload, &RESPONSE_CODE) == Some(0);
    let description_success = lookup_string(payload, &RESPONSE_DESCRIPTION)
        .map(|d| d.to_lowercase().contains("success"))
        .unwrap_or(false);
    explicit || code_zero || description_success
}

/// Success heuristic for the initiation reply: an explicit `success: true`
/// or a populated `data` object. Anything ambiguous counts as a failure.
pub fn initiation_accepted(body: &JsonValue) -> bool {
    if body.get("success").and_then(JsonValue::as_bool) == Some(true) {
        return true;
    }
    matches!(body.get("data"), Some(JsonValue::Object(_)))
}
