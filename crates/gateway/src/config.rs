use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "~/.linkgate";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_STORE_IO_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TOMBSTONE_RETENTION_SECS: u64 = 24 * 3600;

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Base of every issued `secureLink`
    pub public_url: String,
    /// Holds tokens.json, bindings.json and logs.json
    pub data_dir: PathBuf,
    pub sweep_interval: Duration,
    /// How long a mutation waits for its namespace lock before reporting `Busy`
    pub lock_timeout: Duration,
    pub io_timeout: Duration,
    /// How long a reclaimed token keeps reporting its terminal reason
    pub tombstone_retention: Duration,
    pub upstream: linkgate_net::Config,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    pub max_body_bytes: usize,
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
        }

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parsed(var("PORT"), DEFAULT_PORT);

        let public_url = var("PUBLIC_URL")
            .unwrap_or_else(|| default_public_url(&host, port))
            .trim_end_matches('/')
            .to_string();

        let data_dir = var("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let data_dir = PathBuf::from(shellexpand::tilde(&data_dir).to_string());

        let sweep_interval = Duration::from_secs(parsed(
            var("SWEEP_INTERVAL_SECS"),
            DEFAULT_SWEEP_INTERVAL_SECS,
        ));
        let lock_timeout =
            Duration::from_millis(parsed(var("LOCK_TIMEOUT_MS"), DEFAULT_LOCK_TIMEOUT_MS));
        let io_timeout = Duration::from_millis(parsed(
            var("STORE_IO_TIMEOUT_MS"),
            DEFAULT_STORE_IO_TIMEOUT_MS,
        ));
        let tombstone_retention = Duration::from_secs(parsed(
            var("TOMBSTONE_RETENTION_SECS"),
            DEFAULT_TOMBSTONE_RETENTION_SECS,
        ));

        for (name, value) in [
            ("SWEEP_INTERVAL_SECS", sweep_interval),
            ("LOCK_TIMEOUT_MS", lock_timeout),
            ("STORE_IO_TIMEOUT_MS", io_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        let mut upstream = linkgate_net::Config::default().with_timeout(parsed(
            var("UPSTREAM_TIMEOUT_SECS"),
            linkgate_net::DEFAULT_TIMEOUT_SECS,
        ));
        if let Some(proxy) = var("UPSTREAM_PROXY").filter(|p| !p.trim().is_empty()) {
            upstream = upstream.with_proxy(proxy.trim());
        }

        let rate_limit_per_second = parsed(var("RATE_LIMIT_PER_SECOND"), 10u64).max(1);
        let rate_limit_burst = parsed(var("RATE_LIMIT_BURST"), 20u32).max(1);
        let max_body_bytes = parsed(var("MAX_BODY_BYTES"), 64 * 1024usize);

        Ok(Self {
            host,
            port,
            public_url,
            data_dir,
            sweep_interval,
            lock_timeout,
            io_timeout,
            tombstone_retention,
            upstream,
            rate_limit_per_second,
            rate_limit_burst,
            max_body_bytes,
        })
    }

    /// Defaults rooted at `data_dir`, for tests and embedding
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}

/// Links must point somewhere a client can connect, so a wildcard bind address becomes loopback.
fn default_public_url(host: &str, port: u16) -> String {
    match host {
        "0.0.0.0" | "::" | "[::]" => format!("http://127.0.0.1:{}", port),
        h if h.contains(':') && !h.starts_with('[') => format!("http://[{}]:{}", h, port),
        h => format!("http://{}:{}", h, port),
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            public_url: default_public_url("0.0.0.0", DEFAULT_PORT),
            data_dir: PathBuf::from(shellexpand::tilde(DEFAULT_DATA_DIR).to_string()),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            io_timeout: Duration::from_millis(DEFAULT_STORE_IO_TIMEOUT_MS),
            tombstone_retention: Duration::from_secs(DEFAULT_TOMBSTONE_RETENTION_SECS),
            upstream: linkgate_net::Config::default(),
            rate_limit_per_second: 10,
            rate_limit_burst: 20,
            max_body_bytes: 64 * 1024,
        }
    }
}
