use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Process settings, read once from `SLOTDESK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    /// Replayed journal records above which the journal is compacted at startup.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub notify_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7878,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            notify_timeout: Duration::from_millis(3000),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            bind: lookup("SLOTDESK_BIND").unwrap_or(d.bind),
            port: parsed(&lookup, "SLOTDESK_PORT").unwrap_or(d.port),
            data_dir: lookup("SLOTDESK_DATA_DIR").map_or(d.data_dir, PathBuf::from),
            max_connections: parsed::<usize>(&lookup, "SLOTDESK_MAX_CONNECTIONS")
                .filter(|n| *n > 0)
                .unwrap_or(d.max_connections),
            compact_threshold: parsed(&lookup, "SLOTDESK_COMPACT_THRESHOLD")
                .unwrap_or(d.compact_threshold),
            metrics_port: parsed(&lookup, "SLOTDESK_METRICS_PORT"),
            notify_timeout: parsed(&lookup, "SLOTDESK_NOTIFY_TIMEOUT_MS")
                .map_or(d.notify_timeout, Duration::from_millis),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotdesk.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring unparseable {key}={raw:?}");
            None
        }
    }
}
