/// The public shape of a delivery link: `{base}/{programID}/{accountLogin}/{tokenID}`.
/// The download endpoint and every client parse links through this type.
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SdkError};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Locator {
    pub program_id: String,
    pub account_login: String,
    pub token_id: String,
}

/// Why `value` cannot be used as one path segment of a link, if it cannot.
pub fn segment_problem(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        return Some("must not be empty");
    }
    if value.contains(['/', '?', '#', '%']) {
        return Some("must not contain '/', '?', '#' or '%'");
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Some("must not contain whitespace or control characters");
    }
    None
}

impl Locator {
    pub fn new(program_id: &str, account_login: &str, token_id: &str) -> Result<Self> {
        for (name, value) in [
            ("programID", program_id),
            ("accountLogin", account_login),
            ("tokenID", token_id),
        ] {
            if let Some(problem) = segment_problem(value) {
                return Err(SdkError::InvalidLocator(format!("{} {}", name, problem)));
            }
        }

        Ok(Self {
            program_id: program_id.to_string(),
            account_login: account_login.to_string(),
            token_id: token_id.to_string(),
        })
    }

    /// Path relative to the gateway root, with a leading slash
    pub fn path(&self) -> String {
        format!(
            "/{}/{}/{}",
            self.program_id, self.account_login, self.token_id
        )
    }

    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }

    /// Path of the access log listing for this link
    pub fn logs_path(&self) -> String {
        format!("/logs{}", self.path())
    }

    /// Accepts a full URL or a bare path. The last three path segments are used, so
    /// gateways mounted below a prefix still parse.
    pub fn parse(link: &str) -> Result<Self> {
        let link = link.trim();
        let without_fragment = link.split('#').next().unwrap_or_default();
        let without_query = without_fragment.split('?').next().unwrap_or_default();

        let path = match without_query.split_once("://") {
            Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
            None => without_query,
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 3 {
            return Err(SdkError::InvalidLocator(format!(
                "expected .../{{programID}}/{{accountLogin}}/{{tokenID}}, got '{}'",
                link
            )));
        }

        let tail = &segments[segments.len() - 3..];
        Self::new(tail[0], tail[1], tail[2])
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for Locator {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
