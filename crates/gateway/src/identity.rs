use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes mixed into every token ID
const ENTROPY_BYTES: usize = 16;

/// Opaque token ID: hex SHA-256 over the issuing principal, the current time and fresh
/// OS randomness. Not sequential and not invertible to its inputs.
pub fn new_token_id(program_id: &str, account_login: &str) -> String {
    let mut entropy = [0u8; ENTROPY_BYTES];
    OsRng.fill_bytes(&mut entropy);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(b"linkgate_token_id:");
    hasher.update((program_id.len() as u64).to_le_bytes());
    hasher.update(program_id.as_bytes());
    hasher.update((account_login.len() as u64).to_le_bytes());
    hasher.update(account_login.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(entropy);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_id_shape() {
        let id = new_token_id("ea-pro", "5012345");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_token_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| new_token_id("p", "a")).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_token_id_does_not_embed_inputs() {
        let id = new_token_id("program", "account");
        assert!(!id.contains("program"));
        assert!(!id.contains("account"));
    }
}
