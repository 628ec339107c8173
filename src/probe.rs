use std::io::Write;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::protocol::{ClientEvent, Envelope, ServerEvent, SpeechToTextArgs};
use crate::transport::{MessageChannel, WsChannel};

/// The three checks, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Liveness,
    Calibration,
    SpeechToText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// The server answered with a domain error (`error_response` or `success: false`).
    ServerError(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: Step,
    pub outcome: StepOutcome,
    /// Responses read while the step ran.
    pub responses: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub steps: Vec<StepReport>,
}

impl ProbeReport {
    /// Server-reported errors still count as a conformant answer; a timeout does not.
    pub fn passed(&self) -> bool {
        !self.steps.is_empty()
            && self
                .steps
                .iter()
                .all(|s| s.outcome != StepOutcome::TimedOut)
    }

    pub fn step(&self, step: Step) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }
}

/// Per-run request parameters.
#[derive(Debug, Clone)]
pub struct ExchangePlan {
    pub calibration_attempt_id: String,
    pub speech_args: SpeechToTextArgs,
    pub response_timeout: Duration,
}

impl ExchangePlan {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            calibration_attempt_id: config.calibration_attempt_id(),
            speech_args: config.speech_args(),
            response_timeout: config.response_timeout(),
        }
    }
}

/// Top-level entry: run the probe and fold every failure into `false`.
pub async fn probe_server<W: Write>(config: &ProbeConfig, out: &mut W) -> bool {
    match run(config, out).await {
        Ok(report) => {
            let passed = report.passed();
            info!("Probe finished: passed={} steps={:?}", passed, report.steps);
            let timed_out = report
                .step(Step::SpeechToText)
                .is_some_and(|s| s.outcome == StepOutcome::TimedOut);
            if timed_out {
                report_line(out, "Speech-to-text step timed out; counting the run as failed.");
            }
            passed
        }
        Err(ProbeError::ConnectionRefused { uri }) => {
            error!("Connection refused by {}", uri);
            report_line(out, &format!("Could not connect to server at {uri}"));
            report_line(out, "Make sure the speech-to-text server is running!");
            false
        }
        Err(e) => {
            error!("Probe failed: {}", e);
            report_line(out, &format!("Error: {e}"));
            false
        }
    }
}

/// Failure-path console output; the verdict stands even if the write fails.
fn report_line<W: Write>(out: &mut W, line: &str) {
    if let Err(e) = writeln!(out, "{line}") {
        debug!("Failed to write console output: {}", e);
    }
}

/// Connect, run the exchange, and close the connection whatever happened.
pub async fn run<W: Write>(config: &ProbeConfig, out: &mut W) -> Result<ProbeReport, ProbeError> {
    let uri = config.uri();
    writeln!(out, "Connecting to speech-to-text server at {uri}...")?;
    let mut channel = WsChannel::connect(&uri).await?;
    writeln!(out, "Connected to server.")?;

    let plan = ExchangePlan::from_config(config);
    let result = exchange(&mut channel, out, &plan).await;

    if let Err(e) = channel.close().await {
        debug!("Error while closing connection: {}", e);
    }

    let report = result?;
    writeln!(out, "\nProbe completed.")?;
    Ok(report)
}

/// Drive liveness, calibration and speech-to-text over `channel`, in order.
pub async fn exchange<C, W>(
    channel: &mut C,
    out: &mut W,
    plan: &ExchangePlan,
) -> Result<ProbeReport, ProbeError>
where
    C: MessageChannel + ?Sized,
    W: Write,
{
    let mut report = ProbeReport::default();
    report.steps.push(check_liveness(channel, out).await?);
    report
        .steps
        .push(check_calibration(channel, out, &plan.calibration_attempt_id).await?);
    report.steps.push(
        check_speech_to_text(channel, out, &plan.speech_args, plan.response_timeout).await?,
    );
    Ok(report)
}

async fn send<C: MessageChannel + ?Sized>(
    channel: &mut C,
    event: &ClientEvent,
) -> Result<(), ProbeError> {
    debug!("Sending {} event", event.name());
    channel.send_text(event.to_frame()?).await
}

async fn receive<C: MessageChannel + ?Sized>(channel: &mut C) -> Result<Envelope, ProbeError> {
    let text = channel.recv_text().await?;
    Envelope::parse(&text)
}

async fn check_liveness<C, W>(channel: &mut C, out: &mut W) -> Result<StepReport, ProbeError>
where
    C: MessageChannel + ?Sized,
    W: Write,
{
    writeln!(out, "\n[1/3] Liveness: sending test message...")?;
    send(channel, &ClientEvent::Test {}).await?;

    let response = receive(channel).await?;
    writeln!(out, "Server response: {response}")?;

    Ok(StepReport {
        step: Step::Liveness,
        outcome: StepOutcome::Completed,
        responses: 1,
    })
}

async fn check_calibration<C, W>(
    channel: &mut C,
    out: &mut W,
    attempt_id: &str,
) -> Result<StepReport, ProbeError>
where
    C: MessageChannel + ?Sized,
    W: Write,
{
    writeln!(out, "\n[2/3] Calibration: testing microphone calibration...")?;
    writeln!(out, "Please stay quiet for a few seconds while the server calibrates...")?;
    send(
        channel,
        &ClientEvent::CalibrateMicrophone {
            attempt_id: attempt_id.to_string(),
        },
    )
    .await?;

    let mut response = receive(channel).await?;
    let mut responses = 1;
    writeln!(out, "Calibration response: {response}")?;

    if ServerEvent::from(&response) == ServerEvent::MicListening {
        writeln!(out, "Server is listening for calibration...")?;
        response = receive(channel).await?;
        responses += 1;
        writeln!(out, "Final calibration response: {response}")?;
    }

    let outcome = match ServerEvent::from(&response) {
        ServerEvent::ErrorResponse { error_msg } => StepOutcome::ServerError(describe(error_msg)),
        _ => StepOutcome::Completed,
    };
    Ok(StepReport {
        step: Step::Calibration,
        outcome,
        responses,
    })
}

async fn check_speech_to_text<C, W>(
    channel: &mut C,
    out: &mut W,
    args: &SpeechToTextArgs,
    response_timeout: Duration,
) -> Result<StepReport, ProbeError>
where
    C: MessageChannel + ?Sized,
    W: Write,
{
    writeln!(out, "\n[3/3] Speech-to-text: testing speech recognition...")?;
    writeln!(out, "The server will listen for your voice. Speak something when prompted!")?;
    send(channel, &ClientEvent::StartSpeechToText { args: args.clone() }).await?;

    let mut responses = 0;
    let outcome = loop {
        let response = match timeout(response_timeout, receive(channel)).await {
            Ok(response) => response?,
            Err(_) => {
                warn!("No response within {:?}", response_timeout);
                writeln!(
                    out,
                    "Timeout waiting for response after {}s",
                    response_timeout.as_secs()
                )?;
                break StepOutcome::TimedOut;
            }
        };
        responses += 1;
        writeln!(out, "STT response: {response}")?;

        match ServerEvent::from(&response) {
            ServerEvent::MicListening => {
                writeln!(out, "Server is listening for speech... Speak now!")?;
            }
            ServerEvent::SpeechToTextResult {
                success: true,
                transcription,
                ..
            } => {
                writeln!(out, "Success! You said: '{}'", transcription.unwrap_or_default())?;
                break StepOutcome::Completed;
            }
            ServerEvent::SpeechToTextResult { error_msg, .. } => {
                let message = describe(error_msg);
                writeln!(out, "Error: {message}")?;
                break StepOutcome::ServerError(message);
            }
            ServerEvent::ErrorResponse { error_msg } => {
                let message = describe(error_msg);
                writeln!(out, "Server error: {message}")?;
                break StepOutcome::ServerError(message);
            }
            ServerEvent::TestEcho | ServerEvent::Other { .. } => {
                debug!("Ignoring {} while waiting for a result", response.event);
            }
        }
    };

    Ok(StepReport {
        step: Step::SpeechToText,
        outcome,
        responses,
    })
}

fn describe(error_msg: Option<String>) -> String {
    error_msg.unwrap_or_else(|| "no error message given".to_string())
}
