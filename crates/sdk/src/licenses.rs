/// License binding payloads (`/bind`, `/mql5/verify`)
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::string_or_number;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindRequest {
    #[serde(rename = "programID", deserialize_with = "string_or_number")]
    pub program_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub account_login: String,
    /// Validity in days from now; fractions allowed
    pub days: f64,
    #[serde(default)]
    pub is_demo: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(rename = "programID", deserialize_with = "string_or_number")]
    pub program_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub account_login: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    pub is_demo: bool,
    /// `None` when the account was never bound
    pub expiry_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_request_is_demo_defaults_false() {
        let req: BindRequest =
            serde_json::from_str(r#"{"programID":"ea-1","accountLogin":"77","days":30}"#).unwrap();
        assert!(!req.is_demo);
        assert_eq!(req.days, 30.0);
    }

    #[test]
    fn test_bind_request_requires_days() {
        let result =
            serde_json::from_str::<BindRequest>(r#"{"programID":"ea-1","accountLogin":"77"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_verify_response_unbound_shape() {
        let json = serde_json::to_value(VerifyResponse {
            valid: false,
            is_demo: false,
            expiry_date: None,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "valid": false, "isDemo": false, "expiryDate": null })
        );
    }
}
