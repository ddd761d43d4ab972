//! Payment initiation: validate input, push to the gateway, persist the
//! attempt, and link it to its order when one is referenced.

use crate::database::orders::OrderStore;
use crate::database::payment_attempts::{NewPaymentAttempt, PaymentAttemptStore};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::extract;
use crate::payments::gateway::PaymentGateway;
use crate::payments::phone::{is_valid_msisdn, normalize_msisdn};
use crate::payments::types::{AttemptStatus, PushRequest, RawAmount};
use crate::services::non_critical;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Caller-facing initiation input, before validation.
#[derive(Debug, Clone, Default)]
pub struct InitiateCommand {
    pub phone: Option<String>,
    pub amount: Option<RawAmount>,
    pub external_reference: Option<String>,
    pub callback_url: Option<String>,
    pub metadata: Option<JsonValue>,
}

/// Successful initiation: the gateway accepted the push and the subscriber
/// is being prompted on their phone.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub attempt_id: Uuid,
    pub msisdn: String,
    pub amount: i64,
    /// Provider payload the client needs for status polling.
    pub data: JsonValue,
}

pub struct PaymentInitiator {
    gateway: Option<Arc<dyn PaymentGateway>>,
    attempts: Arc<dyn PaymentAttemptStore>,
    orders: Arc<dyn OrderStore>,
}

impl PaymentInitiator {
    pub fn new(
        gateway: Option<Arc<dyn PaymentGateway>>,
        attempts: Arc<dyn PaymentAttemptStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        Self {
            gateway,
            attempts,
            orders,
        }
    }

    /// Run the full initiation pipeline. Validation failures abort before
    /// the gateway is touched; a transport failure aborts before anything
    /// is persisted (there is nothing to correlate later).
    pub async fn initiate(&self, command: InitiateCommand) -> PaymentResult<InitiatedPayment> {
        let raw_phone = command
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(PaymentError::MissingPhone)?;

        let msisdn = normalize_msisdn(raw_phone);
        if !is_valid_msisdn(&msisdn) {
            return Err(PaymentError::InvalidPhoneFormat {
                input: raw_phone.to_string(),
            });
        }

        let amount = command
            .amount
            .as_ref()
            .and_then(RawAmount::as_positive_int)
            .ok_or_else(|| PaymentError::InvalidAmount {
                input: command
                    .amount
                    .as_ref()
                    .map(RawAmount::display)
                    .unwrap_or_default(),
            })?;

        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| PaymentError::GatewayNotConfigured {
                message: "gateway credentials are not configured".to_string(),
            })?;

        let push = PushRequest {
            msisdn: msisdn.clone(),
            amount,
            account_reference: command.external_reference.clone(),
            callback_url: command.callback_url.clone(),
            metadata: command.metadata.clone(),
        };
        let reply = gateway.initiate_push(&push).await?;

        let body = reply.body_json();
        let accepted = extract::initiation_accepted(&body);
        let attempt = self
            .attempts
            .insert(NewPaymentAttempt {
                msisdn: msisdn.clone(),
                amount,
                external_reference: command.external_reference.clone(),
                provider_response: Some(body.clone()),
                status: if accepted {
                    AttemptStatus::Initiated
                } else {
                    AttemptStatus::Failed
                },
            })
            .await?;

        if !accepted {
            warn!(
                attempt_id = %attempt.id,
                http_status = reply.http_status,
                "gateway declined the push"
            );
            return Err(PaymentError::ProviderRejected {
                message: extract::lookup_string(&body, &extract::RESPONSE_DESCRIPTION)
                    .unwrap_or_else(|| "payment request was not accepted".to_string()),
                detail: Some(body),
                http_status: reply.http_status,
            });
        }

        if let Some(reference) = command.external_reference.as_deref() {
            self.attach_order(reference, attempt.id, &msisdn).await;
        }

        info!(
            attempt_id = %attempt.id,
            msisdn = %msisdn,
            amount = amount,
            "payment initiated"
        );
        let data = body.get("data").cloned().unwrap_or(body);
        Ok(InitiatedPayment {
            attempt_id: attempt.id,
            msisdn,
            amount,
            data,
        })
    }

    /// Link the attempt to its order. The push already succeeded at the
    /// gateway, so nothing in here may fail the initiation.
    async fn attach_order(&self, reference: &str, attempt_id: Uuid, msisdn: &str) {
        let Some(matched) = non_critical("find_order", self.orders.find_order(reference)).await
        else {
            return;
        };
        match matched {
            Some(order) => {
                non_critical(
                    "attach_payment",
                    self.orders.attach_payment(&order.id, attempt_id, msisdn),
                )
                .await;
            }
            None => {
                info!(reference = reference, "no order matches external reference");
            }
        }
    }
}
