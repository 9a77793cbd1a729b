use crate::core::{MirrorError, Result};
use crate::notify::TRANSACTION_CHANNEL;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime settings of the mirroring layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MirrorConfig {
    /// Page size of list views
    pub page_limit: usize,

    /// Delay before a free-text query change is applied
    #[serde(with = "duration_ms", rename = "debounceMs")]
    pub debounce: Duration,

    /// Largest accepted batch of creates
    pub batch_limit: usize,

    /// Name of the transaction broadcast
    pub channel: String,

    /// Name of the category assigned to uncategorized media
    pub default_category: String,

    /// Capacity of the gateway request queue
    pub ipc_queue_depth: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            page_limit: 500,
            debounce: Duration::from_millis(500),
            batch_limit: 50,
            channel: TRANSACTION_CHANNEL.to_string(),
            default_category: "Default".to_string(),
            ipc_queue_depth: 256,
        }
    }
}

impl MirrorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    pub fn default_category(mut self, name: &str) -> Self {
        self.default_category = name.to_string();
        self
    }

    pub fn ipc_queue_depth(mut self, depth: usize) -> Self {
        self.ipc_queue_depth = depth;
        self
    }

    /// Defaults overridden by `VIEWMIRROR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("VIEWMIRROR_PAGE_LIMIT") {
            self.page_limit = parse_number("VIEWMIRROR_PAGE_LIMIT", &value)?;
        }
        if let Some(value) = lookup("VIEWMIRROR_DEBOUNCE_MS") {
            self.debounce = Duration::from_millis(parse_number("VIEWMIRROR_DEBOUNCE_MS", &value)? as u64);
        }
        if let Some(value) = lookup("VIEWMIRROR_BATCH_LIMIT") {
            self.batch_limit = parse_number("VIEWMIRROR_BATCH_LIMIT", &value)?;
        }
        if let Some(value) = lookup("VIEWMIRROR_CHANNEL") {
            self.channel = value;
        }
        if let Some(value) = lookup("VIEWMIRROR_IPC_QUEUE_DEPTH") {
            self.ipc_queue_depth = parse_number("VIEWMIRROR_IPC_QUEUE_DEPTH", &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Partial JSON documents keep the defaults for missing keys.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MirrorError::Config(format!("invalid config document: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("pageLimit", self.page_limit),
            ("batchLimit", self.batch_limit),
            ("ipcQueueDepth", self.ipc_queue_depth),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(MirrorError::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.channel.trim().is_empty() {
            return Err(MirrorError::Config("channel name cannot be empty".to_string()));
        }
        if self.default_category.trim().is_empty() {
            return Err(MirrorError::Config("default category name cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| MirrorError::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
