use serde_json::Value as JsonValue;
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Errors surfaced by the payment initiation and status-query paths.
///
/// Callback processing never produces these: the webhook handler always
/// acknowledges the provider and records failures internally.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("phone number is required")]
    MissingPhone,

    #[error("invalid phone number format: {input}")]
    InvalidPhoneFormat { input: String },

    #[error("amount must be a positive whole number: {input}")]
    InvalidAmount { input: String },

    #[error("M-Pesa gateway is not configured: {message}")]
    GatewayNotConfigured { message: String },

    #[error("M-Pesa gateway unreachable: {message}")]
    GatewayUnreachable { message: String },

    #[error("M-Pesa rejected the request: {message}")]
    ProviderRejected {
        message: String,
        detail: Option<JsonValue>,
        http_status: u16,
    },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl PaymentError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::MissingPhone => 400,
            PaymentError::InvalidPhoneFormat { .. } => 400,
            PaymentError::InvalidAmount { .. } => 400,
            PaymentError::ProviderRejected { .. } => 400,
            PaymentError::GatewayNotConfigured { .. } => 500,
            PaymentError::GatewayUnreachable { .. } => 502,
            PaymentError::Storage { .. } => 500,
        }
    }

    /// Message safe to show to the paying customer. Gateway and storage
    /// detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::MissingPhone => "Phone number is required".to_string(),
            PaymentError::InvalidPhoneFormat { .. } => {
                "Enter a valid Safaricom number, e.g. 0712345678".to_string()
            }
            PaymentError::InvalidAmount { .. } => {
                "Amount must be a whole number greater than zero".to_string()
            }
            PaymentError::GatewayNotConfigured { .. } => {
                "Payments are temporarily unavailable".to_string()
            }
            PaymentError::GatewayUnreachable { .. } => {
                // The push may or may not have been delivered; the outcome
                // is unknown, not failed.
                "We could not confirm your payment request. If an M-Pesa prompt \
                 appears on your phone, complete it; otherwise try again"
                    .to_string()
            }
            PaymentError::ProviderRejected { message, .. } => message.clone(),
            PaymentError::Storage { .. } => "An internal error occurred".to_string(),
        }
    }
}

impl From<crate::database::error::DatabaseError> for PaymentError {
    fn from(err: crate::database::error::DatabaseError) -> Self {
        PaymentError::Storage {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping_matches_error_class() {
        assert_eq!(PaymentError::MissingPhone.http_status_code(), 400);
        assert_eq!(
            PaymentError::InvalidPhoneFormat {
                input: "abc".to_string()
            }
            .http_status_code(),
            400
        );
        assert_eq!(
            PaymentError::GatewayNotConfigured {
                message: "missing key".to_string()
            }
            .http_status_code(),
            500
        );
        assert_eq!(
            PaymentError::GatewayUnreachable {
                message: "timeout".to_string()
            }
            .http_status_code(),
            502
        );
    }

    #[test]
    fn gateway_detail_is_not_leaked_in_user_messages() {
        let err = PaymentError::GatewayUnreachable {
            message: "dns lookup failed for internal-gw.example".to_string(),
        };
        assert!(!err.user_message().contains("internal-gw"));
    }
}
