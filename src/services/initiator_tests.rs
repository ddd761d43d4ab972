use crate::payments::error::PaymentError;
use crate::payments::types::RawAmount;
use crate::services::initiator::{InitiateCommand, PaymentInitiator};
use crate::services::testkit::{json_reply, transport_failure, MemoryAttemptStore, MemoryOrderStore, ScriptedGateway};
use serde_json::json;
use std::sync::Arc;

fn command(phone: &str, amount: i64) -> InitiateCommand {
    InitiateCommand {
        phone: Some(phone.to_string()),
        amount: Some(RawAmount::Int(amount)),
        ..Default::default()
    }
}

struct Harness {
    gateway: Arc<ScriptedGateway>,
    attempts: Arc<MemoryAttemptStore>,
    orders: Arc<MemoryOrderStore>,
    initiator: PaymentInitiator,
}

fn harness(gateway: ScriptedGateway, orders: MemoryOrderStore) -> Harness {
    let gateway = Arc::new(gateway);
    let attempts = Arc::new(MemoryAttemptStore::default());
    let orders = Arc::new(orders);
    let initiator = PaymentInitiator::new(
        Some(gateway.clone()),
        attempts.clone(),
        orders.clone(),
    );
    Harness {
        gateway,
        attempts,
        orders,
        initiator,
    }
}

fn accepted_reply() -> ScriptedGateway {
    ScriptedGateway::pushing(Ok(json_reply(
        200,
        json!({
            "success": true,
            "data": {
                "TransactionReference": "TXN1",
                "CustomerMessage": "Check your phone"
            }
        }),
    )))
}

#[tokio::test]
async fn missing_phone_aborts_before_the_gateway() {
    let h = harness(accepted_reply(), MemoryOrderStore::default());
    let result = h
        .initiator
        .initiate(InitiateCommand {
            amount: Some(RawAmount::Int(500)),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(PaymentError::MissingPhone)));
    assert_eq!(h.gateway.push_count(), 0);
    assert!(h.attempts.all().is_empty());
}

#[tokio::test]
async fn invalid_phone_aborts_before_the_gateway() {
    let h = harness(accepted_reply(), MemoryOrderStore::default());
    let result = h.initiator.initiate(command("abc", 500)).await;
    assert!(matches!(result, Err(PaymentError::InvalidPhoneFormat { .. })));
    assert_eq!(h.gateway.push_count(), 0);
    assert!(h.attempts.all().is_empty());
}

#[tokio::test]
async fn non_positive_and_fractional_amounts_are_rejected() {
    let h = harness(accepted_reply(), MemoryOrderStore::default());
    for amount in [
        RawAmount::Int(0),
        RawAmount::Int(-5),
        RawAmount::Float(12.5),
        RawAmount::Text("abc".to_string()),
    ] {
        let result = h
            .initiator
            .initiate(InitiateCommand {
                phone: Some("0712345678".to_string()),
                amount: Some(amount),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidAmount { .. })));
    }
    assert_eq!(h.gateway.push_count(), 0);
}

#[tokio::test]
async fn unconfigured_gateway_is_a_server_side_error() {
    let attempts = Arc::new(MemoryAttemptStore::default());
    let orders = Arc::new(MemoryOrderStore::default());
    let initiator = PaymentInitiator::new(None, attempts.clone(), orders);
    let result = initiator.initiate(command("0712345678", 500)).await;
    assert!(matches!(result, Err(PaymentError::GatewayNotConfigured { .. })));
    assert!(attempts.all().is_empty());
}

#[tokio::test]
async fn transport_failure_persists_nothing() {
    let h = harness(
        ScriptedGateway::pushing(Err(transport_failure())),
        MemoryOrderStore::default(),
    );
    let result = h.initiator.initiate(command("0712345678", 500)).await;
    assert!(matches!(result, Err(PaymentError::GatewayUnreachable { .. })));
    assert_eq!(h.gateway.push_count(), 1);
    assert!(h.attempts.all().is_empty());
}

#[tokio::test]
async fn accepted_push_persists_one_initiated_attempt() {
    let h = harness(accepted_reply(), MemoryOrderStore::default());
    let payment = h
        .initiator
        .initiate(command("0712 345-678", 500))
        .await
        .expect("initiation should succeed");

    assert_eq!(payment.msisdn, "254712345678");
    assert_eq!(payment.amount, 500);
    assert_eq!(payment.data["TransactionReference"], "TXN1");

    let attempts = h.attempts.all();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, "initiated");
    assert_eq!(attempts[0].msisdn, "254712345678");
}

#[tokio::test]
async fn provider_declined_push_persists_one_failed_attempt() {
    let h = harness(
        ScriptedGateway::pushing(Ok(json_reply(
            400,
            json!({ "success": false, "message": "insufficient merchant balance" }),
        ))),
        MemoryOrderStore::default(),
    );
    let result = h.initiator.initiate(command("0712345678", 500)).await;

    match result {
        Err(PaymentError::ProviderRejected {
            message,
            http_status,
            detail,
        }) => {
            assert_eq!(message, "insufficient merchant balance");
            assert_eq!(http_status, 400);
            assert!(detail.is_some());
        }
        other => panic!("expected ProviderRejected, got {:?}", other),
    }

    let attempts = h.attempts.all();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, "failed");
}

#[tokio::test]
async fn ambiguous_reply_is_treated_as_a_failure() {
    let h = harness(
        ScriptedGateway::pushing(Ok(json_reply(200, json!({})))),
        MemoryOrderStore::default(),
    );
    let result = h.initiator.initiate(command("0712345678", 500)).await;
    assert!(matches!(result, Err(PaymentError::ProviderRejected { .. })));
    assert_eq!(h.attempts.all()[0].status, "failed");
}

#[tokio::test]
async fn unparseable_reply_body_is_persisted_and_treated_as_failure() {
    use crate::payments::types::{GatewayReply, ReplyBody};
    let h = harness(
        ScriptedGateway::pushing(Ok(GatewayReply {
            http_status: 502,
            body: ReplyBody::Raw("<html>bad gateway</html>".to_string()),
        })),
        MemoryOrderStore::default(),
    );
    let result = h.initiator.initiate(command("0712345678", 500)).await;
    assert!(matches!(result, Err(PaymentError::ProviderRejected { .. })));

    let attempts = h.attempts.all();
    assert_eq!(attempts[0].status, "failed");
    assert_eq!(
        attempts[0].provider_response,
        Some(json!({ "raw": "<html>bad gateway</html>" }))
    );
}

#[tokio::test]
async fn referenced_order_is_linked_to_the_attempt() {
    let h = harness(accepted_reply(), MemoryOrderStore::default().with_order("ORDER123"));
    let payment = h
        .initiator
        .initiate(InitiateCommand {
            phone: Some("0712345678".to_string()),
            amount: Some(RawAmount::Int(500)),
            external_reference: Some("ORDER123".to_string()),
            ..Default::default()
        })
        .await
        .expect("initiation should succeed");

    let order = h.orders.order("ORDER123").expect("order exists");
    assert_eq!(order.payment_attempt_id, Some(payment.attempt_id));
    assert_eq!(order.mpesa_phone.as_deref(), Some("254712345678"));
    assert_eq!(order.payment_method.as_deref(), Some("mpesa"));
    // Linking never moves an order to paid.
    assert_eq!(order.status, "pending");
}

#[tokio::test]
async fn unknown_order_reference_does_not_fail_the_initiation() {
    let h = harness(accepted_reply(), MemoryOrderStore::default());
    let result = h
        .initiator
        .initiate(InitiateCommand {
            phone: Some("0712345678".to_string()),
            amount: Some(RawAmount::Int(500)),
            external_reference: Some("NO-SUCH-ORDER".to_string()),
            ..Default::default()
        })
        .await;
    assert!(result.is_ok());
    assert_eq!(h.attempts.all().len(), 1);
}

#[tokio::test]
async fn amount_is_accepted_as_a_numeric_string() {
    let h = harness(accepted_reply(), MemoryOrderStore::default());
    let payment = h
        .initiator
        .initiate(InitiateCommand {
            phone: Some("0712345678".to_string()),
            amount: Some(RawAmount::Text("500".to_string())),
            ..Default::default()
        })
        .await
        .expect("initiation should succeed");
    assert_eq!(payment.amount, 500);
}
