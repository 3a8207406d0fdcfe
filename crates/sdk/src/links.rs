/// Delivery link issuance and revocation payloads
use serde::{Deserialize, Serialize};

use crate::wire::string_or_number;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    /// Upstream URL the link resolves to
    pub target: String,
    #[serde(rename = "programID", deserialize_with = "string_or_number")]
    pub program_id: String,
    /// Lifetime in minutes; fractions allowed
    pub expiry_time_in_mins: f64,
    pub max_link_use: i64,
    #[serde(deserialize_with = "string_or_number")]
    pub account_login: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkResponse {
    /// `{publicUrl}/{programID}/{accountLogin}/{tokenID}`
    pub secure_link: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    #[serde(rename = "programID", deserialize_with = "string_or_number")]
    pub program_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub account_login: String,
    #[serde(rename = "tokenID")]
    pub token_id: String,
}
