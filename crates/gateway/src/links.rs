//! Delivery link lifecycle: issuing, redemption, revocation and reclamation.
//!
//! A record moves Active -> {Expired | Exhausted | Revoked} -> reclaimed. Redemption and the
//! sweep both decide through `LinkRecord::terminal` and both reclaim inside a locked store
//! cycle, so the use counter can never be pushed past `max_uses`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use linkgate_sdk::locator::{segment_problem, Locator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GatewayError, Result};
use crate::identity::new_token_id;
use crate::store::{Change, RecordStore};

/// First path segments the router claims for itself
pub const RESERVED_PROGRAM_IDS: [&str; 3] = ["logs", "mql5", "health"];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub target: String,
    pub owner_program: String,
    pub owner_account: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_uses: u32,
    pub used_count: u32,
    /// Cleared by revocation
    pub active: bool,
}

/// Why a link can no longer be redeemed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminal {
    Expired,
    Exhausted,
    Revoked,
}

impl From<Terminal> for GatewayError {
    fn from(terminal: Terminal) -> Self {
        match terminal {
            Terminal::Expired => GatewayError::Expired,
            Terminal::Exhausted => GatewayError::Exhausted,
            Terminal::Revoked => GatewayError::Revoked,
        }
    }
}

impl LinkRecord {
    /// `None` while the record is redeemable
    pub fn terminal(&self, now: DateTime<Utc>) -> Option<Terminal> {
        if !self.active {
            Some(Terminal::Revoked)
        } else if now >= self.expires_at {
            Some(Terminal::Expired)
        } else if self.used_count >= self.max_uses {
            Some(Terminal::Exhausted)
        } else {
            None
        }
    }

    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.terminal(now).is_none()
    }

    fn is_owned_by(&self, program_id: &str, account_login: &str) -> bool {
        self.owner_program == program_id && self.owner_account == account_login
    }
}

#[derive(Clone, Debug)]
pub struct IssuedLink {
    pub token_id: String,
    pub locator: Locator,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Redemption {
    pub token_id: String,
    pub target: String,
    pub owner_program: String,
    pub owner_account: String,
    /// Count after this redemption
    pub used_count: u32,
    pub max_uses: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reclaimed: usize,
    pub tombstones_pruned: usize,
}

/// Terminal reasons of recently reclaimed links, so late redemptions get 403 instead of 404.
/// Keyed by owner and token ID. In-memory only.
#[derive(Default)]
struct Tombstones {
    entries: Mutex<HashMap<String, (Terminal, DateTime<Utc>)>>,
}

fn owned_key(program_id: &str, account_login: &str, token_id: &str) -> String {
    format!("{}/{}/{}", program_id, account_login, token_id)
}

impl Tombstones {
    fn bury(&self, record: &LinkRecord, token_id: &str, terminal: Terminal, at: DateTime<Utc>) {
        let key = owned_key(&record.owner_program, &record.owner_account, token_id);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (terminal, at));
    }

    fn reason(&self, program_id: &str, account_login: &str, token_id: &str) -> Option<Terminal> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&owned_key(program_id, account_login, token_id))
            .map(|(terminal, _)| *terminal)
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, (_, at)| *at > cutoff);
        before - entries.len()
    }
}

pub struct LinkService {
    store: RecordStore<LinkRecord>,
    tombstones: Arc<Tombstones>,
    tombstone_retention: Duration,
}

impl LinkService {
    pub fn new(store: RecordStore<LinkRecord>, tombstone_retention: Duration) -> Self {
        Self {
            store,
            tombstones: Arc::new(Tombstones::default()),
            tombstone_retention,
        }
    }

    pub fn store(&self) -> &RecordStore<LinkRecord> {
        &self.store
    }

    pub async fn create(
        &self,
        target: &str,
        program_id: &str,
        expiry_minutes: f64,
        max_uses: i64,
        account_login: &str,
    ) -> Result<IssuedLink> {
        if target.trim().is_empty() {
            return Err(GatewayError::InvalidArgument("target is required".into()));
        }
        check_principal(program_id, account_login)?;
        if RESERVED_PROGRAM_IDS.contains(&program_id) {
            return Err(GatewayError::InvalidArgument(format!(
                "programID '{}' is reserved",
                program_id
            )));
        }
        if !expiry_minutes.is_finite() || expiry_minutes <= 0.0 {
            return Err(GatewayError::InvalidArgument(
                "expiryTimeInMins must be greater than zero".into(),
            ));
        }
        if max_uses <= 0 {
            return Err(GatewayError::InvalidArgument(
                "maxLinkUse must be greater than zero".into(),
            ));
        }
        let max_uses = u32::try_from(max_uses)
            .map_err(|_| GatewayError::InvalidArgument("maxLinkUse is too large".into()))?;

        let now = Utc::now();
        let expires_at = TimeDelta::try_milliseconds((expiry_minutes * 60_000.0).round() as i64)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                GatewayError::InvalidArgument("expiryTimeInMins is too large".into())
            })?;

        let token_id = new_token_id(program_id, account_login);
        let locator = Locator::new(program_id, account_login, &token_id)
            .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;

        let record = LinkRecord {
            target: target.to_string(),
            owner_program: program_id.to_string(),
            owner_account: account_login.to_string(),
            created_at: now,
            expires_at,
            max_uses,
            used_count: 0,
            active: true,
        };
        // ID collisions are not checked; 256-bit IDs make them negligible
        self.store
            .update(&token_id, move |_| (Change::Put(record), ()))
            .await?;

        info!(
            "Issued link {}… for {}/{} ({} uses, expires {})",
            short_id(&token_id),
            program_id,
            account_login,
            max_uses,
            expires_at.to_rfc3339()
        );

        Ok(IssuedLink {
            token_id,
            locator,
            expires_at,
        })
    }

    /// Consumes one use of a link owned by `program_id`/`account_login`. A wrong owner looks
    /// like an unknown link. Terminal records are deleted on the way out.
    pub async fn redeem(
        &self,
        program_id: &str,
        account_login: &str,
        token_id: &str,
    ) -> Result<Redemption> {
        let tombstones = self.tombstones.clone();
        let (program, account, id) = (
            program_id.to_string(),
            account_login.to_string(),
            token_id.to_string(),
        );

        let outcome = self
            .store
            .update(token_id, move |record| {
                let now = Utc::now();
                let Some(record) = record.filter(|r| r.is_owned_by(&program, &account)) else {
                    let err = tombstones
                        .reason(&program, &account, &id)
                        .map(GatewayError::from)
                        .unwrap_or(GatewayError::NotFound);
                    return (Change::Keep, Err(err));
                };

                if let Some(terminal) = record.terminal(now) {
                    tombstones.bury(record, &id, terminal, now);
                    return (Change::Delete, Err(terminal.into()));
                }

                let mut updated = record.clone();
                updated.used_count += 1;
                let redemption = Redemption {
                    token_id: id,
                    target: updated.target.clone(),
                    owner_program: updated.owner_program.clone(),
                    owner_account: updated.owner_account.clone(),
                    used_count: updated.used_count,
                    max_uses: updated.max_uses,
                };
                (Change::Put(updated), Ok(redemption))
            })
            .await?;

        match &outcome {
            Ok(redemption) => info!(
                "Redeemed link {}… ({}/{} uses)",
                short_id(token_id),
                redemption.used_count,
                redemption.max_uses
            ),
            Err(e) => debug!(
                "Redemption of {}… refused: {}",
                short_id(token_id),
                e
            ),
        }
        outcome
    }

    /// Deactivates a link owned by `program_id`/`account_login`. Reclaimed on next contact.
    pub async fn revoke(&self, program_id: &str, account_login: &str, token_id: &str) -> Result<()> {
        let (program_id, account_login) = (program_id.to_string(), account_login.to_string());

        self.store
            .update(token_id, move |record| match record {
                Some(record) if record.is_owned_by(&program_id, &account_login) => {
                    if !record.active {
                        return (Change::Keep, Ok(()));
                    }
                    let mut updated = record.clone();
                    updated.active = false;
                    (Change::Put(updated), Ok(()))
                }
                _ => (Change::Keep, Err(GatewayError::NotFound)),
            })
            .await??;

        info!("Revoked link {}…", short_id(token_id));
        Ok(())
    }

    /// Deletes every non-redeemable record in one store cycle and ages out old tombstones.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let tombstones = self.tombstones.clone();
        let reclaimed = self
            .store
            .retain(move |token_id, record| {
                let now = Utc::now();
                match record.terminal(now) {
                    Some(terminal) => {
                        tombstones.bury(record, token_id, terminal, now);
                        false
                    }
                    None => true,
                }
            })
            .await?;

        let tombstones_pruned = TimeDelta::from_std(self.tombstone_retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .map(|cutoff| self.tombstones.prune(cutoff))
            .unwrap_or(0);

        Ok(SweepReport {
            reclaimed,
            tombstones_pruned,
        })
    }
}

/// Log-friendly prefix of a token ID
pub(crate) fn short_id(token_id: &str) -> &str {
    token_id.get(..8).unwrap_or(token_id)
}

/// Program and account IDs become path segments of the link and parts of composite keys.
pub(crate) fn check_principal(program_id: &str, account_login: &str) -> Result<()> {
    for (name, value) in [("programID", program_id), ("accountLogin", account_login)] {
        if let Some(problem) = segment_problem(value) {
            return Err(GatewayError::InvalidArgument(format!("{} {}", name, problem)));
        }
    }
    Ok(())
}
