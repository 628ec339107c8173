use std::path::PathBuf;

use clap::Parser;

use crate::config::ProbeConfig;

#[derive(Debug, Parser)]
#[command(
    name = "stt-probe",
    about = "Conformance probe for a WebSocket speech-to-text server"
)]
pub struct Cli {
    /// Server port (falls back to the configured port when invalid)
    pub port: Option<String>,

    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// Path to a YAML or JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seconds to wait for each server message during speech-to-text
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Port argument parsing; zero and out-of-range values are rejected.
pub fn parse_port(raw: &str) -> Option<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

impl Cli {
    /// Apply command-line overrides. Returns a warning line when the port
    /// argument was unusable and the configured port was kept.
    pub fn apply(&self, config: &mut ProbeConfig) -> Option<String> {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(secs) = self.timeout {
            config.speech.response_timeout_secs = secs;
        }

        let raw = self.port.as_deref()?;
        match parse_port(raw) {
            Some(port) => {
                config.server.port = port;
                None
            }
            None => Some(format!(
                "Invalid port number. Using default port {}.",
                config.server.port
            )),
        }
    }
}
