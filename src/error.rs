use thiserror::Error;

/// Everything that can abort a probe run.
///
/// A speech-step timeout is not an error: it is recorded on the report.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not connect to server at {uri}: connection refused")]
    ConnectionRefused { uri: String },

    #[error("failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server closed the connection while a response was pending")]
    Closed,

    #[error("malformed response: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to write console output: {0}")]
    Console(#[from] std::io::Error),
}
