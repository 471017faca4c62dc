//! Safety configuration sourcing.
//!
//! When mounted as a ConfigMap volume each key becomes a file, so the
//! source order prefers `/etc/agenttrader-safety/<KEY>` (or
//! `$AGENTTRADER_SAFETY_DIR`) over the environment variable of the same
//! name. Every parse failure biases to the halted state.

use crate::application::monitoring::SafetyConfigSource;
use std::path::{Path, PathBuf};

pub const DEFAULT_STALE_THRESHOLD_SECONDS: u32 = 30;
pub const DEFAULT_SAFETY_DIR: &str = "/etc/agenttrader-safety";

#[derive(Debug, Clone)]
pub struct SafetyEnvConfig {
    dir: PathBuf,
}

impl SafetyEnvConfig {
    pub fn from_env() -> Self {
        let dir = std::env::var("AGENTTRADER_SAFETY_DIR")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SAFETY_DIR.to_string());
        Self {
            dir: PathBuf::from(dir),
        }
    }

    pub fn with_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn read_file(&self, key: &str) -> Option<String> {
        let content = std::fs::read_to_string(self.dir.join(key)).ok()?;
        let trimmed = content.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }

    /// File value wins over the environment variable of the same name.
    fn config_value(&self, key: &str) -> Option<String> {
        if let Some(v) = self.read_file(key) {
            return Some(v);
        }
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Global kill switch. SAFE DEFAULT: missing or unparseable => true
    /// (halted).
    pub fn load_kill_switch(&self) -> bool {
        let Some(raw) = self.config_value("KILL_SWITCH") else {
            return true;
        };
        match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => true,
        }
    }

    /// Marketdata staleness threshold in seconds.
    /// SAFE DEFAULT: 30 if missing/unparseable/non-positive; capped at 3600.
    pub fn load_stale_threshold_seconds(&self) -> u32 {
        let Some(raw) = self.config_value("STALE_THRESHOLD_SECONDS") else {
            return DEFAULT_STALE_THRESHOLD_SECONDS;
        };
        match raw.parse::<i64>() {
            Ok(n) if n >= 1 => n.min(3600) as u32,
            _ => DEFAULT_STALE_THRESHOLD_SECONDS,
        }
    }

    /// Operational enable flag. Defaults to enabled; the kill switch is the
    /// fail-closed control, this one is for planned maintenance.
    pub fn load_trading_enabled(&self) -> bool {
        let Some(raw) = self.config_value("TRADING_ENABLED") else {
            return true;
        };
        !matches!(raw.to_lowercase().as_str(), "0" | "false" | "no" | "off")
    }
}

impl SafetyConfigSource for SafetyEnvConfig {
    fn trading_enabled(&self) -> bool {
        self.load_trading_enabled()
    }

    fn kill_switch(&self) -> bool {
        self.load_kill_switch()
    }

    fn stale_threshold_seconds(&self) -> u32 {
        self.load_stale_threshold_seconds()
    }
}
