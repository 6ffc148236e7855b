use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use lazy_static::lazy_static;
use url::Url;

use crate::{WidgetError, WidgetResult};

/// Shared default for `mount`, `wait_for` and `refresh`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_WIDGET_URL: &str = "https://embed.widgetbridge.dev/widget";

lazy_static! {
    /// Base address of the remote widget, fixed when the crate is built.
    static ref WIDGET_BASE_URL: Result<Url, url::ParseError> =
        Url::parse(option_env!("WIDGET_BRIDGE_BASE_URL").unwrap_or(DEFAULT_WIDGET_URL));
}

/// The build-time base address.
pub fn widget_base_url() -> WidgetResult<Url> {
    WIDGET_BASE_URL.clone().map_err(|e| {
        WidgetError::invalid_config(format!("widget base address is not a valid URL: {}", e))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetConfig {
    #[serde(default = "default_timeout", with = "duration_ms")]
    pub default_timeout: Duration,

    /// Pause between the frame's load event and the first init post.
    #[serde(default = "default_init_delay", with = "duration_ms")]
    pub init_delay: Duration,

    #[serde(default = "default_init_retry_interval", with = "duration_ms")]
    pub init_retry_interval: Duration,

    /// 1 reproduces a single fixed-delay init.
    #[serde(default = "default_init_max_attempts")]
    pub init_max_attempts: u32,

    /// Log dropped inbound messages at `warn` instead of `trace`.
    #[serde(default)]
    pub debug: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            init_delay: default_init_delay(),
            init_retry_interval: default_init_retry_interval(),
            init_max_attempts: default_init_max_attempts(),
            debug: false,
        }
    }
}

impl WidgetConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> WidgetResult<Self> {
        let file = File::open(path)
            .map_err(|e| WidgetError::invalid_config(format!("Failed to open config file: {}", e)))?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            WidgetError::invalid_config(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(s: &str) -> WidgetResult<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| WidgetError::invalid_config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WidgetResult<()> {
        if self.default_timeout.is_zero() {
            return Err(WidgetError::invalid_config("default_timeout must be positive"));
        }
        if self.init_max_attempts == 0 {
            return Err(WidgetError::invalid_config(
                "init_max_attempts must be at least 1",
            ));
        }
        if self.init_max_attempts > 1 && self.init_retry_interval.is_zero() {
            return Err(WidgetError::invalid_config(
                "init_retry_interval must be positive when retrying",
            ));
        }
        Ok(())
    }
}

// デフォルト値の定義
fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_init_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_init_retry_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_init_max_attempts() -> u32 {
    3
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
