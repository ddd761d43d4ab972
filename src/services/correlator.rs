//! Webhook correlation: audit the delivery, match it to a payment attempt,
//! and settle the order it concerns.
//!
//! Nothing in this module returns an error. The gateway penalizes
//! integrations that answer its webhooks with failures, so every internal
//! problem is logged and absorbed; the audit table keeps the evidence.

use crate::database::callbacks::CallbackStore;
use crate::database::orders::{NewReceipt, OrderStore, SettleOutcome};
use crate::database::payment_attempts::{PaymentAttempt, PaymentAttemptStore};
use crate::payments::extract::{self, CallbackFields, CorrelationKey};
use crate::payments::types::AttemptStatus;
use crate::services::non_critical;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const PROVIDER: &str = "mpesa";

/// What a callback delivery amounted to. Informational only: the webhook
/// endpoint acknowledges `200 ok` in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationOutcome {
    /// No attempt or order matched; only the audit row was written.
    Unmatched,
    /// A payment attempt was updated but no order was settled.
    AttemptUpdated {
        attempt_id: Uuid,
        status: AttemptStatus,
    },
    /// The order moved to paid and a receipt was created.
    OrderSettled {
        order_id: String,
        receipt_id: Uuid,
    },
    /// The order had already been settled by an earlier delivery.
    DuplicateReceipt { order_id: String },
}

pub struct CallbackCorrelator {
    attempts: Arc<dyn PaymentAttemptStore>,
    orders: Arc<dyn OrderStore>,
    callbacks: Arc<dyn CallbackStore>,
}

impl CallbackCorrelator {
    pub fn new(
        attempts: Arc<dyn PaymentAttemptStore>,
        orders: Arc<dyn OrderStore>,
        callbacks: Arc<dyn CallbackStore>,
    ) -> Self {
        Self {
            attempts,
            orders,
            callbacks,
        }
    }

    /// Process one webhook delivery end to end.
    pub async fn process(&self, payload: &JsonValue, headers: &JsonValue) -> CorrelationOutcome {
        // The audit row is the only durable trace when correlation fails,
        // so it is written before anything is interpreted.
        non_critical(
            "append_callback",
            self.callbacks.append(PROVIDER, payload, headers),
        )
        .await;

        let fields = extract::callback_fields(payload);
        let success = extract::success_flag(payload);
        info!(
            transaction_reference = fields.transaction_reference.as_deref().unwrap_or("-"),
            external_reference = fields.external_reference.as_deref().unwrap_or("-"),
            success = success,
            "processing gateway callback"
        );

        let attempt = self.find_attempt(&fields).await;
        let status = if success {
            AttemptStatus::Completed
        } else {
            AttemptStatus::Failed
        };
        if let Some(attempt) = &attempt {
            non_critical(
                "record_outcome",
                self.attempts.record_outcome(attempt.id, status, payload),
            )
            .await;
        }

        if !success {
            return matched_outcome(attempt.as_ref(), status);
        }

        let Some(order_id) = fields
            .external_reference
            .clone()
            .or_else(|| attempt.as_ref().and_then(|a| a.external_reference.clone()))
        else {
            return matched_outcome(attempt.as_ref(), status);
        };

        let Some(order) =
            non_critical("find_order", self.orders.find_order(&order_id)).await.flatten()
        else {
            info!(order_id = %order_id, "callback references no known order");
            return matched_outcome(attempt.as_ref(), status);
        };

        if order.receipt_id.is_some() {
            info!(order_id = %order.id, "order already has a receipt, skipping");
            return CorrelationOutcome::DuplicateReceipt { order_id: order.id };
        }

        let receipt = NewReceipt {
            payment_attempt_id: attempt.as_ref().map(|a| a.id),
            transaction_reference: fields
                .transaction_reference
                .clone()
                .unwrap_or_else(|| order_id.clone()),
            amount: fields
                .amount
                .or_else(|| attempt.as_ref().map(|a| a.amount))
                .unwrap_or(0),
            phone: fields
                .phone
                .clone()
                .or_else(|| attempt.as_ref().map(|a| a.msisdn.clone()))
                .unwrap_or_default(),
            provider: PROVIDER.to_string(),
            provider_payload: payload.clone(),
        };

        match non_critical("settle_order", self.orders.settle_order(&order.id, receipt)).await {
            Some(SettleOutcome::Settled(receipt)) => {
                info!(order_id = %order.id, receipt_id = %receipt.id, "order settled");
                CorrelationOutcome::OrderSettled {
                    order_id: order.id,
                    receipt_id: receipt.id,
                }
            }
            Some(SettleOutcome::AlreadyReceipted) => {
                CorrelationOutcome::DuplicateReceipt { order_id: order.id }
            }
            None => matched_outcome(attempt.as_ref(), status),
        }
    }

    /// Single correlation lookup over the candidate keys, in their priority
    /// order. "Not yet visible" is an empty result, never an error: the
    /// callback can race ahead of the initiation's own write.
    async fn find_attempt(&self, fields: &CallbackFields) -> Option<PaymentAttempt> {
        for key in extract::correlation_candidates(fields) {
            let found = match &key {
                CorrelationKey::TransactionReference(reference) => {
                    non_critical(
                        "find_by_transaction_reference",
                        self.attempts.find_by_transaction_reference(reference),
                    )
                    .await
                    .flatten()
                }
                CorrelationKey::ExternalReference(reference) => {
                    non_critical(
                        "find_by_external_reference",
                        self.attempts.find_by_external_reference(reference),
                    )
                    .await
                    .flatten()
                }
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

fn matched_outcome(attempt: Option<&PaymentAttempt>, status: AttemptStatus) -> CorrelationOutcome {
    match attempt {
        Some(attempt) => CorrelationOutcome::AttemptUpdated {
            attempt_id: attempt.id,
            status,
        },
        None => CorrelationOutcome::Unmatched,
    }
}
