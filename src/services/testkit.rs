//! In-process fakes for the store and gateway seams, shared by the service
//! tests.

use crate::database::callbacks::{CallbackRecord, CallbackStore};
use crate::database::error::DatabaseError;
use crate::database::orders::{NewReceipt, Order, OrderStore, Receipt, SettleOutcome};
use crate::database::payment_attempts::{NewPaymentAttempt, PaymentAttempt, PaymentAttemptStore};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::extract;
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{AttemptStatus, GatewayReply, PushRequest, ReplyBody};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub fn json_reply(http_status: u16, body: JsonValue) -> GatewayReply {
    GatewayReply {
        http_status,
        body: ReplyBody::Json(body),
    }
}

#[derive(Default)]
pub struct MemoryAttemptStore {
    rows: Mutex<Vec<PaymentAttempt>>,
}

impl MemoryAttemptStore {
    pub fn all(&self) -> Vec<PaymentAttempt> {
        self.rows.lock().expect("attempt store lock").clone()
    }
}

#[async_trait]
impl PaymentAttemptStore for MemoryAttemptStore {
    async fn insert(&self, attempt: NewPaymentAttempt) -> Result<PaymentAttempt, DatabaseError> {
        let row = PaymentAttempt {
            id: Uuid::new_v4(),
            msisdn: attempt.msisdn,
            amount: attempt.amount,
            external_reference: attempt.external_reference,
            provider_response: attempt.provider_response,
            provider_callback: None,
            status: attempt.status.as_str().to_string(),
            created_at: Utc::now(),
        };
        self.rows.lock().expect("attempt store lock").push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentAttempt>, DatabaseError> {
        Ok(self
            .rows
            .lock()
            .expect("attempt store lock")
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }

    async fn find_by_transaction_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentAttempt>, DatabaseError> {
        Ok(self
            .rows
            .lock()
            .expect("attempt store lock")
            .iter()
            .rev()
            .find(|row| {
                row.provider_response
                    .as_ref()
                    .and_then(|r| extract::lookup_string(r, &extract::TRANSACTION_REFERENCE))
                    .as_deref()
                    == Some(reference)
            })
            .cloned())
    }

    async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentAttempt>, DatabaseError> {
        Ok(self
            .rows
            .lock()
            .expect("attempt store lock")
            .iter()
            .rev()
            .find(|row| row.external_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        status: AttemptStatus,
        callback: &JsonValue,
    ) -> Result<(), DatabaseError> {
        let mut rows = self.rows.lock().expect("attempt store lock");
        let row = rows.iter_mut().find(|row| row.id == id).ok_or_else(|| {
            DatabaseError::NotFound {
                entity: "PaymentAttempt".to_string(),
                id: id.to_string(),
            }
        })?;
        row.status = status.as_str().to_string();
        row.provider_callback = Some(callback.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
    receipts: Mutex<Vec<Receipt>>,
}

impl MemoryOrderStore {
    pub fn with_order(self, id: &str) -> Self {
        self.orders.lock().expect("order store lock").insert(
            id.to_string(),
            Order {
                id: id.to_string(),
                status: "pending".to_string(),
                mpesa_phone: None,
                payment_method: None,
                payment_attempt_id: None,
                receipt_id: None,
                paid_at: None,
            },
        );
        self
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.orders.lock().expect("order store lock").get(id).cloned()
    }

    pub fn receipts(&self) -> Vec<Receipt> {
        self.receipts.lock().expect("receipt lock").clone()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_order(&self, id: &str) -> Result<Option<Order>, DatabaseError> {
        Ok(self.orders.lock().expect("order store lock").get(id).cloned())
    }

    async fn attach_payment(
        &self,
        order_id: &str,
        attempt_id: Uuid,
        msisdn: &str,
    ) -> Result<bool, DatabaseError> {
        let mut orders = self.orders.lock().expect("order store lock");
        match orders.get_mut(order_id) {
            Some(order) => {
                order.payment_attempt_id = Some(attempt_id);
                order.mpesa_phone = Some(msisdn.to_string());
                order.payment_method = Some("mpesa".to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn settle_order(
        &self,
        order_id: &str,
        receipt: NewReceipt,
    ) -> Result<SettleOutcome, DatabaseError> {
        let mut orders = self.orders.lock().expect("order store lock");
        let order = orders.get_mut(order_id).ok_or_else(|| DatabaseError::NotFound {
            entity: "Order".to_string(),
            id: order_id.to_string(),
        })?;
        if order.receipt_id.is_some() {
            return Ok(SettleOutcome::AlreadyReceipted);
        }

        let row = Receipt {
            id: Uuid::new_v4(),
            order_id: order_id.to_string(),
            payment_attempt_id: receipt.payment_attempt_id,
            transaction_reference: receipt.transaction_reference,
            amount: receipt.amount,
            phone: receipt.phone,
            provider: receipt.provider,
            provider_payload: receipt.provider_payload,
            created_at: Utc::now(),
        };
        order.status = "paid".to_string();
        order.paid_at = Some(Utc::now());
        order.receipt_id = Some(row.id);
        self.receipts.lock().expect("receipt lock").push(row.clone());
        Ok(SettleOutcome::Settled(row))
    }
}

#[derive(Default)]
pub struct MemoryCallbackStore {
    rows: Mutex<Vec<CallbackRecord>>,
}

impl MemoryCallbackStore {
    pub fn count(&self) -> usize {
        self.rows.lock().expect("callback lock").len()
    }
}

#[async_trait]
impl CallbackStore for MemoryCallbackStore {
    async fn append(
        &self,
        provider: &str,
        raw_payload: &JsonValue,
        raw_headers: &JsonValue,
    ) -> Result<CallbackRecord, DatabaseError> {
        let row = CallbackRecord {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            raw_payload: raw_payload.clone(),
            raw_headers: raw_headers.clone(),
            received_at: Utc::now(),
        };
        self.rows.lock().expect("callback lock").push(row.clone());
        Ok(row)
    }
}

/// Gateway double that replays a scripted reply and counts invocations.
pub struct ScriptedGateway {
    push_reply: PaymentResult<GatewayReply>,
    status_reply: PaymentResult<GatewayReply>,
    push_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn pushing(reply: PaymentResult<GatewayReply>) -> Self {
        Self {
            push_reply: reply,
            status_reply: Ok(json_reply(200, serde_json::json!({}))),
            push_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_status(mut self, reply: PaymentResult<GatewayReply>) -> Self {
        self.status_reply = reply;
        self
    }

    pub fn push_count(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate_push(&self, _request: &PushRequest) -> PaymentResult<GatewayReply> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.push_reply.clone()
    }

    async fn query_status(&self, _reference: &str) -> PaymentResult<GatewayReply> {
        self.status_reply.clone()
    }
}

/// Convenience: an unreachable-gateway error for scripting transport
/// failures.
pub fn transport_failure() -> PaymentError {
    PaymentError::GatewayUnreachable {
        message: "connection timed out".to_string(),
    }
}
