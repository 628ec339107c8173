mod cli;
mod config;
mod error;
mod probe;
mod protocol;
mod transport;

#[cfg(test)]
mod test_server;

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::ProbeConfig;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match ProbeConfig::locate(cli.config.as_deref()) {
        Some(path) => ProbeConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ProbeConfig::default(),
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut stdout = std::io::stdout();
    if let Some(warning) = cli.apply(&mut config) {
        writeln!(stdout, "{warning}")?;
    }

    let rule = "=".repeat(40);
    writeln!(stdout, "Speech-to-Text Server Conformance Probe")?;
    writeln!(stdout, "{rule}")?;
    writeln!(stdout, "Testing server on port {}", config.server.port)?;
    writeln!(stdout, "Make sure the speech-to-text server is running first!")?;
    writeln!(stdout, "{rule}")?;

    info!("Probing {}", config.uri());
    let passed = probe::probe_server(&config, &mut stdout).await;

    if passed {
        writeln!(stdout, "\nAll checks passed. The speech-to-text server is working correctly.")?;
        Ok(ExitCode::SUCCESS)
    } else {
        writeln!(stdout, "\nChecks failed. Check the server logs for more information.")?;
        Ok(ExitCode::FAILURE)
    }
}
