use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::protocol::SpeechToTextArgs;

/// Config file picked up from the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "stt-probe.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Generated per run when unset.
    #[serde(default)]
    pub attempt_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Generated per run when unset.
    #[serde(default)]
    pub attempt_id: Option<String>,
    #[serde(default = "default_begin_speech_timeout")]
    pub begin_speech_timeout: f64,
    #[serde(default = "default_process_speech_timeout")]
    pub process_speech_timeout: f64,
    #[serde(default = "default_true")]
    pub auto_calibrate_mic: bool,
    #[serde(default = "default_mic_energy_threshold")]
    pub mic_energy_threshold: f64,
    /// Upper bound on each wait for a server message during speech-to-text.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
}

fn default_log_level() -> String {
    "stt_probe=info".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8003
}

fn default_begin_speech_timeout() -> f64 {
    5.0
}

fn default_process_speech_timeout() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_mic_energy_threshold() -> f64 {
    420.0
}

fn default_response_timeout_secs() -> u64 {
    15
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            calibration: CalibrationConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            attempt_id: None,
            begin_speech_timeout: default_begin_speech_timeout(),
            process_speech_timeout: default_process_speech_timeout(),
            auto_calibrate_mic: default_true(),
            mic_energy_threshold: default_mic_energy_threshold(),
            response_timeout_secs: default_response_timeout_secs(),
        }
    }
}

impl ProbeConfig {
    /// Load a config file. `.json`/`.jsonld` files are JSON, anything else YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let content = substitute_env_vars(&raw)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        let config: ProbeConfig = match extension.as_deref() {
            Some("json") | Some("jsonld") => serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON config {}", path.display()))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("invalid YAML config {}", path.display()))?,
        };
        Ok(config)
    }

    /// Pick the config source: explicit path, then `CONFIG_PATH`, then the
    /// default file if it exists. `None` means built-in defaults.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var("CONFIG_PATH") {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            return Some(fallback.to_path_buf());
        }
        debug!("No config file found, using defaults");
        None
    }

    pub fn uri(&self) -> String {
        let host = &self.server.host;
        if host.contains(':') && !host.starts_with('[') {
            format!("ws://[{}]:{}", host, self.server.port)
        } else {
            format!("ws://{}:{}", host, self.server.port)
        }
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.speech.response_timeout_secs)
    }

    pub fn calibration_attempt_id(&self) -> String {
        self.calibration
            .attempt_id
            .clone()
            .unwrap_or_else(|| format!("calibration-{}", Uuid::new_v4()))
    }

    pub fn speech_args(&self) -> SpeechToTextArgs {
        SpeechToTextArgs {
            attempt_id: self
                .speech
                .attempt_id
                .clone()
                .unwrap_or_else(|| format!("stt-{}", Uuid::new_v4())),
            begin_speech_timeout: self.speech.begin_speech_timeout,
            process_speech_timeout: self.speech.process_speech_timeout,
            auto_calibrate_mic: self.speech.auto_calibrate_mic,
            mic_energy_threshold: self.speech.mic_energy_threshold,
        }
    }
}

/// Replace `${VAR}` with the variable's value; unset variables stay as written.
fn substitute_env_vars(content: &str) -> Result<String> {
    let pattern = Regex::new(r"\$\{(\w+)\}")?;
    let replaced = pattern.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    Ok(replaced.into_owned())
}
