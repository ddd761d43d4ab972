use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lifecycle of a payment attempt. `Initiated` means the gateway accepted
/// the push; the asynchronous callback later drives the terminal states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Initiated,
    Failed,
    Completed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Initiated => "initiated",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Amount as clients send it: a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawAmount {
    /// Parse to a positive integer amount in the smallest currency unit.
    /// Floats are accepted only when integral.
    pub fn as_positive_int(&self) -> Option<i64> {
        match self {
            RawAmount::Int(v) if *v > 0 => Some(*v),
            RawAmount::Float(v) if *v > 0.0 && v.fract() == 0.0 && *v <= i64::MAX as f64 => {
                Some(*v as i64)
            }
            RawAmount::Text(s) => s.trim().parse::<i64>().ok().filter(|v| *v > 0),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            RawAmount::Int(v) => v.to_string(),
            RawAmount::Float(v) => v.to_string(),
            RawAmount::Text(s) => s.clone(),
        }
    }
}

/// Input to the gateway's push-payment call, already validated.
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub msisdn: String,
    pub amount: i64,
    pub account_reference: Option<String>,
    pub callback_url: Option<String>,
    pub metadata: Option<JsonValue>,
}

/// A reply the gateway actually delivered, whatever its shape.
///
/// Non-2xx statuses are still replies: the caller inspects the body for the
/// provider's own success signal. Only transport failures are errors.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub http_status: u16,
    pub body: ReplyBody,
}

#[derive(Debug, Clone)]
pub enum ReplyBody {
    /// Body parsed as JSON.
    Json(JsonValue),
    /// Body kept verbatim because it was empty or not valid JSON.
    Raw(String),
}

impl GatewayReply {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.http_status)
    }

    pub fn json(&self) -> Option<&JsonValue> {
        match &self.body {
            ReplyBody::Json(value) => Some(value),
            ReplyBody::Raw(_) => None,
        }
    }

    /// Body as a JSON value, wrapping unparseable text as `{"raw": …}` so it
    /// can be persisted alongside parsed replies.
    pub fn body_json(&self) -> JsonValue {
        match &self.body {
            ReplyBody::Json(value) => value.clone(),
            ReplyBody::Raw(text) => serde_json::json!({ "raw": text }),
        }
    }
}
