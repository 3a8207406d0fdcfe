/// License bindings: which program/account pairs may run, and until when
use chrono::{DateTime, TimeDelta, Utc};
use linkgate_sdk::licenses::VerifyResponse;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GatewayError, Result};
use crate::links::check_principal;
use crate::store::{Change, RecordStore};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub bound_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_demo: bool,
}

impl Binding {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub fn binding_key(program_id: &str, account_login: &str) -> String {
    format!("{}/{}", program_id, account_login)
}

pub struct BindingService {
    store: RecordStore<Binding>,
}

impl BindingService {
    pub fn new(store: RecordStore<Binding>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore<Binding> {
        &self.store
    }

    /// Upserts the binding; a rebind replaces the previous window entirely.
    pub async fn bind(
        &self,
        program_id: &str,
        account_login: &str,
        days: f64,
        is_demo: bool,
    ) -> Result<Binding> {
        check_principal(program_id, account_login)?;
        if !days.is_finite() || days <= 0.0 {
            return Err(GatewayError::InvalidArgument(
                "days must be greater than zero".into(),
            ));
        }

        let now = Utc::now();
        let expires_at = TimeDelta::try_milliseconds((days * MILLIS_PER_DAY).round() as i64)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or_else(|| GatewayError::InvalidArgument("days is too large".into()))?;

        let binding = Binding {
            bound_at: now,
            expires_at,
            is_demo,
        };
        let stored = binding.clone();
        self.store
            .update(&binding_key(program_id, account_login), move |_| {
                (Change::Put(stored), ())
            })
            .await?;

        info!(
            "Bound {}/{} until {}{}",
            program_id,
            account_login,
            expires_at.to_rfc3339(),
            if is_demo { " (demo)" } else { "" }
        );
        Ok(binding)
    }

    pub async fn verify(&self, program_id: &str, account_login: &str) -> Result<VerifyResponse> {
        let binding = self
            .store
            .get(&binding_key(program_id, account_login))
            .await?;

        Ok(match binding {
            Some(binding) => VerifyResponse {
                valid: binding.is_valid(Utc::now()),
                is_demo: binding.is_demo,
                expiry_date: Some(binding.expires_at),
            },
            None => VerifyResponse {
                valid: false,
                is_demo: false,
                expiry_date: None,
            },
        })
    }
}
