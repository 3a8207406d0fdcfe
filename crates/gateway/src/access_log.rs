use chrono::Utc;
use linkgate_sdk::LogEntry;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::links::short_id;
use crate::store::{Change, RecordStore};

pub fn log_key(program_id: &str, account_login: &str, token_id: &str) -> String {
    format!("{}/{}/{}", program_id, account_login, token_id)
}

/// Append-only redemption history, one list per delivery link
pub struct AccessLog {
    store: RecordStore<Vec<LogEntry>>,
}

impl AccessLog {
    pub fn new(store: RecordStore<Vec<LogEntry>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore<Vec<LogEntry>> {
        &self.store
    }

    pub async fn append(
        &self,
        program_id: &str,
        account_login: &str,
        token_id: &str,
        fields: Map<String, Value>,
    ) -> Result<LogEntry> {
        let entry = LogEntry::new(fields, Utc::now());
        let appended = entry.clone();

        let count = self
            .store
            .update(&log_key(program_id, account_login, token_id), move |existing| {
                let mut entries = existing.cloned().unwrap_or_default();
                entries.push(appended);
                let count = entries.len();
                (Change::Put(entries), count)
            })
            .await?;

        debug!(
            "Access #{} logged for {}/{}/{}…",
            count,
            program_id,
            account_login,
            short_id(token_id)
        );
        Ok(entry)
    }

    pub async fn list(
        &self,
        program_id: &str,
        account_login: &str,
        token_id: &str,
    ) -> Result<Vec<LogEntry>> {
        Ok(self
            .store
            .get(&log_key(program_id, account_login, token_id))
            .await?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreTimeouts;
    use serde_json::json;
    use std::time::Duration;

    fn access_log(dir: &std::path::Path) -> AccessLog {
        AccessLog::new(RecordStore::open(
            dir,
            "logs",
            StoreTimeouts {
                lock: Duration::from_secs(5),
                io: Duration::from_secs(5),
            },
        ))
    }

    fn fields(ip: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("ip".into(), json!(ip));
        map.insert("userAgent".into(), json!("curl/8.5"));
        map
    }

    #[tokio::test]
    async fn test_unknown_key_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = access_log(dir.path());
        assert!(log.list("p", "a", "t").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_accumulate_per_link() {
        let dir = tempfile::tempdir().unwrap();
        let log = access_log(dir.path());

        log.append("p", "a", "t1", fields("10.0.0.1")).await.unwrap();
        log.append("p", "a", "t2", fields("10.0.0.2")).await.unwrap();
        log.append("p", "a", "t1", fields("10.0.0.3")).await.unwrap();

        let first = log.list("p", "a", "t1").await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].field("ip"), Some("10.0.0.1"));
        assert_eq!(first[1].field("ip"), Some("10.0.0.3"));
        assert!(first[0].timestamp <= first[1].timestamp);

        let second = log.list("p", "a", "t2").await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].field("userAgent"), Some("curl/8.5"));
    }

    #[tokio::test]
    async fn test_server_timestamp_wins() {
        let dir = tempfile::tempdir().unwrap();
        let log = access_log(dir.path());

        let mut spoofed = fields("10.0.0.1");
        spoofed.insert("timestamp".into(), json!("1999-01-01T00:00:00Z"));
        let before = Utc::now();
        let entry = log.append("p", "a", "t", spoofed).await.unwrap();

        assert!(entry.timestamp >= before);
        let stored = log.list("p", "a", "t").await.unwrap();
        assert_eq!(stored[0].timestamp, entry.timestamp);
        assert!(!stored[0].fields.contains_key("timestamp"));
    }
}
