//! Outbound client for the M-Pesa push-payment gateway.
//!
//! The client authenticates with a short-lived bearer token obtained from
//! the gateway's OAuth endpoint, then issues the push or status call. It
//! never persists anything: recording the attempt is the caller's job.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{GatewayReply, PushRequest, ReplyBody};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STATUS_PATH: &str = "/mpesa/stkpushquery/v1/query";

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub base_url: String,
    pub callback_url: Option<String>,
    pub timeout_secs: u64,
}

impl MpesaConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let consumer_key = std::env::var("MPESA_CONSUMER_KEY").unwrap_or_default();
        let consumer_secret = std::env::var("MPESA_CONSUMER_SECRET").unwrap_or_default();
        if consumer_key.is_empty() || consumer_secret.is_empty() {
            return Err(PaymentError::GatewayNotConfigured {
                message: "MPESA_CONSUMER_KEY and MPESA_CONSUMER_SECRET are required".to_string(),
            });
        }
        Ok(Self {
            consumer_key,
            consumer_secret,
            base_url: std::env::var("MPESA_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".to_string()),
            callback_url: std::env::var("MPESA_CALLBACK_URL").ok(),
            timeout_secs: std::env::var("MPESA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(8),
        })
    }
}

/// Seam between the orchestration services and the wire protocol.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ask the provider to push a payment prompt to the subscriber's phone.
    async fn initiate_push(&self, request: &PushRequest) -> PaymentResult<GatewayReply>;

    /// Look up the current state of a previously initiated push.
    async fn query_status(&self, reference: &str) -> PaymentResult<GatewayReply>;
}

pub struct MpesaGateway {
    config: MpesaConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: String,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig) -> PaymentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::GatewayUnreachable {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(MpesaConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn effective_callback(&self, request: &PushRequest) -> Option<String> {
        request
            .callback_url
            .clone()
            .or_else(|| self.config.callback_url.clone())
    }

    async fn access_token(&self) -> PaymentResult<String> {
        let credentials = format!("{}:{}", self.config.consumer_key, self.config.consumer_secret);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

        let response = self
            .client
            .get(self.endpoint(TOKEN_PATH))
            .header("Authorization", format!("Basic {}", encoded))
            .send()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable {
                message: format!("token request failed: {}", e),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PaymentError::ProviderRejected {
                message: format!("token request returned HTTP {}", status.as_u16()),
                detail: serde_json::from_str(&text).ok(),
                http_status: status.as_u16(),
            });
        }

        let token: TokenReply =
            serde_json::from_str(&text).map_err(|_| PaymentError::ProviderRejected {
                message: "token response was not valid JSON".to_string(),
                detail: None,
                http_status: status.as_u16(),
            })?;
        Ok(token.access_token)
    }

    /// Deliver the request and capture whatever came back. The body may be
    /// JSON, garbage, or empty; all three are valid replies.
    async fn send(&self, request: reqwest::RequestBuilder) -> PaymentResult<GatewayReply> {
        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable {
                message: format!("gateway request failed: {}", e),
            })?;

        let http_status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = match serde_json::from_str::<JsonValue>(&text) {
            Ok(parsed) => ReplyBody::Json(parsed),
            Err(_) => ReplyBody::Raw(text),
        };
        Ok(GatewayReply { http_status, body })
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    async fn initiate_push(&self, request: &PushRequest) -> PaymentResult<GatewayReply> {
        let token = self.access_token().await?;
        let payload = serde_json::json!({
            "PhoneNumber": request.msisdn,
            "Amount": request.amount.to_string(),
            "AccountReference": request.account_reference,
            "CallBackURL": self.effective_callback(request),
            "TransactionDesc": "Sokoni order payment",
            "Metadata": request.metadata,
        });

        debug!(msisdn = %request.msisdn, amount = request.amount, "sending STK push");
        self.send(
            self.client
                .post(self.endpoint(PUSH_PATH))
                .bearer_auth(&token)
                .json(&payload),
        )
        .await
    }

    async fn query_status(&self, reference: &str) -> PaymentResult<GatewayReply> {
        let token = self.access_token().await?;
        self.send(
            self.client
                .get(self.endpoint(STATUS_PATH))
                .query(&[("reference", reference)])
                .bearer_auth(&token),
        )
        .await
    }
}
