use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProbeError;

pub const EVENT_TEST: &str = "test";
pub const EVENT_NOTIFY_MIC_LISTENING: &str = "notify_mic_listening";
pub const EVENT_SPEECH_TO_TEXT_RESULT: &str = "speech_to_text_result";
pub const EVENT_ERROR_RESPONSE: &str = "error_response";

/// Requests the probe sends, serialized as `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Test {},
    CalibrateMicrophone {
        #[serde(rename = "attemptId")]
        attempt_id: String,
    },
    StartSpeechToText { args: SpeechToTextArgs },
}

/// Argument bundle for `start_speech_to_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechToTextArgs {
    pub attempt_id: String,
    /// Seconds the server waits for speech to begin.
    pub begin_speech_timeout: f64,
    /// Seconds the server allows for processing captured speech.
    pub process_speech_timeout: f64,
    pub auto_calibrate_mic: bool,
    pub mic_energy_threshold: f64,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Test {} => EVENT_TEST,
            ClientEvent::CalibrateMicrophone { .. } => "calibrate_microphone",
            ClientEvent::StartSpeechToText { .. } => "start_speech_to_text",
        }
    }

    pub fn to_frame(&self) -> Result<String, ProbeError> {
        serde_json::to_string(self).map_err(ProbeError::Encode)
    }
}

/// Raw inbound frame: an event name plus an untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, ProbeError> {
        serde_json::from_str(text).map_err(ProbeError::Malformed)
    }

    fn field(&self, key: &str) -> Option<&Value> {
        self.data.as_object().and_then(|data| data.get(key))
    }

    fn str_field(&self, key: &str) -> Option<String> {
        self.field(key).and_then(Value::as_str).map(str::to_string)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = match &self.data {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        write!(f, "{} {}", self.event, data)
    }
}

/// Inbound events the probe understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The server's echo of `test`.
    TestEcho,
    MicListening,
    SpeechToTextResult {
        success: bool,
        transcription: Option<String>,
        error_msg: Option<String>,
    },
    ErrorResponse { error_msg: Option<String> },
    /// Anything else, e.g. the calibration result.
    Other { event: String },
}

impl From<&Envelope> for ServerEvent {
    fn from(envelope: &Envelope) -> Self {
        match envelope.event.as_str() {
            EVENT_TEST => ServerEvent::TestEcho,
            EVENT_NOTIFY_MIC_LISTENING => ServerEvent::MicListening,
            EVENT_SPEECH_TO_TEXT_RESULT => ServerEvent::SpeechToTextResult {
                success: envelope
                    .field("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                transcription: envelope.str_field("transcription"),
                error_msg: envelope.str_field("errorMsg"),
            },
            EVENT_ERROR_RESPONSE => ServerEvent::ErrorResponse {
                error_msg: envelope.str_field("errorMsg"),
            },
            other => ServerEvent::Other {
                event: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_args() -> SpeechToTextArgs {
        SpeechToTextArgs {
            attempt_id: "test_stt_456".to_string(),
            begin_speech_timeout: 5.0,
            process_speech_timeout: 10.0,
            auto_calibrate_mic: true,
            mic_energy_threshold: 420.0,
        }
    }

    #[test]
    fn test_outbound_shapes() {
        let test = serde_json::to_value(ClientEvent::Test {}).unwrap();
        assert_eq!(test, json!({"event": "test", "data": {}}));

        let calibrate = serde_json::to_value(ClientEvent::CalibrateMicrophone {
            attempt_id: "test_calibration_123".to_string(),
        })
        .unwrap();
        assert_eq!(
            calibrate,
            json!({"event": "calibrate_microphone", "data": {"attemptId": "test_calibration_123"}})
        );

        let stt = serde_json::to_value(ClientEvent::StartSpeechToText { args: sample_args() }).unwrap();
        assert_eq!(
            stt,
            json!({
                "event": "start_speech_to_text",
                "data": {"args": {
                    "attemptId": "test_stt_456",
                    "beginSpeechTimeout": 5.0,
                    "processSpeechTimeout": 10.0,
                    "autoCalibrateMic": true,
                    "micEnergyThreshold": 420.0
                }}
            })
        );
    }

    #[test]
    fn test_outbound_frames_parse_back() {
        let events = [
            ClientEvent::Test {},
            ClientEvent::CalibrateMicrophone {
                attempt_id: "cal-1".to_string(),
            },
            ClientEvent::StartSpeechToText { args: sample_args() },
        ];
        for event in events {
            let frame = event.to_frame().unwrap();
            let envelope = Envelope::parse(&frame).unwrap();
            assert_eq!(envelope.event, event.name());
            assert_eq!(envelope.data, serde_json::to_value(&event).unwrap()["data"]);

            let parsed: ClientEvent = serde_json::from_str(&frame).unwrap();
            assert_eq!(parsed, event);
        }
    }

    #[test]
    fn test_speech_result_fields() {
        let envelope = Envelope::parse(
            r#"{"event":"speech_to_text_result","data":{"success":true,"transcription":"hello"}}"#,
        )
        .unwrap();
        assert_eq!(
            ServerEvent::from(&envelope),
            ServerEvent::SpeechToTextResult {
                success: true,
                transcription: Some("hello".to_string()),
                error_msg: None,
            }
        );
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let envelope = Envelope::parse(r#"{"event":"speech_to_text_result"}"#).unwrap();
        assert_eq!(envelope.data, Value::Null);
        assert_eq!(
            ServerEvent::from(&envelope),
            ServerEvent::SpeechToTextResult {
                success: false,
                transcription: None,
                error_msg: None,
            }
        );

        let envelope =
            Envelope::parse(r#"{"event":"error_response","data":{"errorMsg":42}}"#).unwrap();
        assert_eq!(
            ServerEvent::from(&envelope),
            ServerEvent::ErrorResponse { error_msg: None }
        );
    }

    #[test]
    fn test_unrecognized_events() {
        let envelope = Envelope::parse(r#"{"event":"test","data":{}}"#).unwrap();
        assert_eq!(ServerEvent::from(&envelope), ServerEvent::TestEcho);

        let envelope =
            Envelope::parse(r#"{"event":"calibration_done","data":{"threshold":300}}"#).unwrap();
        assert_eq!(
            ServerEvent::from(&envelope),
            ServerEvent::Other {
                event: "calibration_done".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(Envelope::parse("not json"), Err(ProbeError::Malformed(_))));
        assert!(matches!(Envelope::parse("[1,2]"), Err(ProbeError::Malformed(_))));
        assert!(matches!(
            Envelope::parse(r#"{"data":{}}"#),
            Err(ProbeError::Malformed(_))
        ));
    }

    #[test]
    fn test_envelope_display() {
        let envelope = Envelope::parse(r#"{"event":"notify_mic_listening"}"#).unwrap();
        assert_eq!(envelope.to_string(), "notify_mic_listening {}");
    }
}
