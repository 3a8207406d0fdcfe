/// Access log entries recorded on every successful redemption
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Caller-supplied fields (ip, userAgent, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Assigned by the gateway when the entry is appended
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// A caller-supplied `timestamp` field is dropped in favour of the server value.
    pub fn new(mut fields: Map<String, Value>, timestamp: DateTime<Utc>) -> Self {
        fields.remove("timestamp");
        Self { fields, timestamp }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
}
