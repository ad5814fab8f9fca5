//! Response envelope and request DTOs.
//!
//! Every response, success or error, uses the same envelope:
//! `{success, data?, error?: {message}, meta: {timestamp}}`. Stack traces
//! never leave the server; clients get a human-readable message only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Currencies accepted by the API. Ledger accounts hold exactly one.
pub const SUPPORTED_CURRENCIES: [&str; 3] = ["USD", "INR", "EUR"];

/// Payment-method tokens look like `tok_visa`.
const SOURCE_PREFIX: &str = "tok_";

/// Matches the VARCHAR(50) source column.
const MAX_SOURCE_LEN: usize = 50;

/// Sanity ceiling on a single payment: 100,000.00 in minor units.
const MAX_AMOUNT: i64 = 10_000_000;

const MAX_DESCRIPTION_LEN: usize = 500;

/// Uniform API response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
}

impl Meta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Meta::now(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                message: message.into(),
                code: None,
            }),
            meta: Meta::now(),
        }
    }

    pub fn err_with_code(message: impl Into<String>, code: &'static str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                message: message.into(),
                code: Some(code),
            }),
            meta: Meta::now(),
        }
    }
}

/// `POST /api/v1/payments` request body.
///
/// The merchant is taken from the authenticated API key, never from the
/// body, so one merchant cannot create payments for another.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: i64,
    pub currency: String,
    pub source: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreatePaymentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.amount <= 0 {
            return Err(AppError::Validation(
                "Amount must be a positive integer in minor units (cents)".to_string(),
            ));
        }
        if self.amount > MAX_AMOUNT {
            return Err(AppError::Validation(format!(
                "Amount must be at most {} minor units",
                MAX_AMOUNT
            )));
        }
        validate_currency(&self.currency)?;
        if !self.source.starts_with(SOURCE_PREFIX) || self.source.len() > MAX_SOURCE_LEN {
            return Err(AppError::Validation(
                "Source must be a valid card token (e.g. tok_visa)".to_string(),
            ));
        }
        if let Some(desc) = &self.description {
            if desc.len() > MAX_DESCRIPTION_LEN {
                return Err(AppError::Validation(format!(
                    "Description must be at most {} characters",
                    MAX_DESCRIPTION_LEN
                )));
            }
        }
        Ok(())
    }
}

/// `POST /api/v1/accounts` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub currency: String,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        if self.name.len() > 255 {
            return Err(AppError::Validation(
                "Name must be at most 255 characters".to_string(),
            ));
        }
        validate_currency(&self.currency)
    }
}

fn validate_currency(currency: &str) -> Result<(), AppError> {
    if SUPPORTED_CURRENCIES.contains(&currency) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Currency must be one of {}",
            SUPPORTED_CURRENCIES.join(", ")
        )))
    }
}

/// Path parameters carrying a single resource id.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("Invalid {} ID format", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment_request() -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount: 1000,
            currency: "USD".to_string(),
            source: "tok_visa".to_string(),
            description: None,
        }
    }

    #[test]
    fn test_valid_payment_request() {
        assert!(payment_request().validate().is_ok());
    }

    #[test]
    fn test_payment_rejects_nonpositive_amount() {
        for amount in [0, -1, -5000] {
            let mut req = payment_request();
            req.amount = amount;
            assert!(matches!(req.validate(), Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn test_payment_rejects_unknown_currency() {
        let mut req = payment_request();
        req.currency = "GBP".to_string();
        assert!(req.validate().is_err());

        // Lowercase is not accepted either.
        req.currency = "usd".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_payment_rejects_oversized_amount() {
        let mut req = payment_request();
        req.amount = MAX_AMOUNT;
        assert!(req.validate().is_ok());
        req.amount = MAX_AMOUNT + 1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_payment_rejects_bad_source_token() {
        let mut req = payment_request();
        req.source = "card_visa".to_string();
        assert!(req.validate().is_err());

        let mut req = payment_request();
        req.source = format!("tok_{}", "x".repeat(60));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_account_request_bounds() {
        let ok = CreateAccountRequest {
            name: "Acme Corp".to_string(),
            currency: "EUR".to_string(),
        };
        assert!(ok.validate().is_ok());

        let empty = CreateAccountRequest {
            name: "   ".to_string(),
            currency: "EUR".to_string(),
        };
        assert!(empty.validate().is_err());

        let long = CreateAccountRequest {
            name: "x".repeat(256),
            currency: "EUR".to_string(),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "payment").unwrap(), id);
        assert!(parse_id("not-a-uuid", "payment").is_err());
    }

    #[test]
    fn test_envelope_success_shape() {
        let response = ApiResponse::ok(serde_json::json!({"id": 1}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["id"], 1);
        assert!(value.get("error").is_none());
        assert!(value["meta"]["timestamp"].is_string());
    }

    #[test]
    fn test_envelope_error_shape() {
        let response = ApiResponse::<()>::err_with_code("Insufficient balance", "INSUFFICIENT_BALANCE");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["message"], "Insufficient balance");
        assert_eq!(value["error"]["code"], "INSUFFICIENT_BALANCE");
        assert!(value.get("data").is_none());
    }
}
