use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::replay::Pacing;
use crate::store::default_db_path;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    /// Where mapping sets are persisted. `None` keeps them in memory only.
    pub db_path: Option<PathBuf>,
    pub headless: bool,
    pub element_timeout: Duration,
    /// Failure screenshots are written here when set
    pub screenshot_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = match env::var("FORMFILL_DB_PATH") {
            Ok(path) if path.eq_ignore_ascii_case("memory") => None,
            Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => default_db_path()
                .map_err(|e| tracing::warn!("No data directory for mappings, using memory: {}", e))
                .ok(),
        };

        Self {
            port: env::var("FORMFILL_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8765),
            host: env::var("FORMFILL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            db_path,
            headless: env::var("FORMFILL_HEADLESS")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            element_timeout: env::var("FORMFILL_ELEMENT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(10)),
            screenshot_dir: env::var("FORMFILL_SCREENSHOT_DIR")
                .ok()
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Replay options seeded from this configuration
    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            element_timeout: self.element_timeout,
            ..ReplayOptions::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8765,
            host: "127.0.0.1".to_string(),
            db_path: None,
            headless: true,
            element_timeout: Duration::from_secs(10),
            screenshot_dir: None,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Timing knobs for one replay
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// How long to wait for any selector candidate to appear
    pub element_timeout: Duration,
    /// Upper bound on a single fill or click
    pub action_timeout: Duration,
    /// Interval between selector probes while waiting
    pub poll_interval: Duration,
    /// Delay between keystrokes for char-by-char fields
    pub char_delay: Duration,
    pub pacing: Pacing,
    /// Abort when a navigation leaves the mapping set's origin
    pub enforce_origin: bool,
}

impl ReplayOptions {
    /// No waiting anywhere; selectors are probed once
    pub fn immediate() -> Self {
        Self {
            element_timeout: Duration::ZERO,
            action_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            char_delay: Duration::ZERO,
            pacing: Pacing::none(),
            enforce_origin: true,
        }
    }
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(10),
            action_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            char_delay: Duration::from_millis(50),
            pacing: Pacing::default(),
            enforce_origin: true,
        }
    }
}
