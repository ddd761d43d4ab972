//! Synchronous status polling, for clients whose callback is delayed or
//! lost. Thin pass-through to the gateway's status query.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::extract;
use crate::payments::gateway::PaymentGateway;
use serde_json::Value as JsonValue;
use std::sync::Arc;

pub struct StatusPoller {
    gateway: Option<Arc<dyn PaymentGateway>>,
}

impl StatusPoller {
    pub fn new(gateway: Option<Arc<dyn PaymentGateway>>) -> Self {
        Self { gateway }
    }

    /// Query the gateway for a transaction's current state and pass the
    /// payload through. Carries no state of its own.
    pub async fn query(&self, reference: &str) -> PaymentResult<JsonValue> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| PaymentError::GatewayNotConfigured {
                message: "gateway credentials are not configured".to_string(),
            })?;

        let reply = gateway.query_status(reference).await?;
        let body = reply.body_json();
        if !reply.is_ok() {
            return Err(PaymentError::ProviderRejected {
                message: extract::lookup_string(&body, &extract::RESPONSE_DESCRIPTION)
                    .unwrap_or_else(|| {
                        format!("status query returned HTTP {}", reply.http_status)
                    }),
                detail: Some(body),
                http_status: reply.http_status,
            });
        }
        Ok(body)
    }
}
