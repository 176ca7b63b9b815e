use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::exercise::ExerciseType;
use crate::pose::Keypoint;
use crate::workout::PerformanceMetrics;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricPayload {
    #[serde(flatten)]
    pub metrics: PerformanceMetrics,
    pub exercise_type: ExerciseType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedKeypoint {
    pub name: String,
    #[serde(flatten)]
    pub keypoint: Keypoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PosePayload {
    pub keypoints: Vec<NamedKeypoint>,
    pub score: f64,
    pub exercise_type: ExerciseType,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepPayload {
    pub rep_count: u32,
    pub exercise_type: ExerciseType,
    pub timestamp: i64,
}

/// Message kinds the client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    DeviceRegister,
    WorkoutStarted,
    WorkoutStopped,
    BiometricData { data: BiometricPayload },
    PoseData { data: PosePayload },
    RepDetection { data: RepPayload },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::DeviceRegister => "device_register",
            OutboundMessage::WorkoutStarted => "workout_started",
            OutboundMessage::WorkoutStopped => "workout_stopped",
            OutboundMessage::BiometricData { .. } => "biometric_data",
            OutboundMessage::PoseData { .. } => "pose_data",
            OutboundMessage::RepDetection { .. } => "rep_detection",
        }
    }
}

/// `{ type, deviceId, exerciseType, timestamp, data? }`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    #[serde(flatten)]
    pub message: OutboundMessage,
    pub device_id: String,
    pub exercise_type: ExerciseType,
    pub timestamp: i64,
}

impl OutboundEnvelope {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("relay frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("relay frame is not a JSON object")]
    NotAnObject,
    #[error("relay frame has no \"type\" field")]
    MissingType,
    #[error("\"{0}\" message has no payload")]
    MissingPayload(String),
    #[error("\"{kind}\" payload is malformed: {source}")]
    BadPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Form verdict carried by `ai_feedback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackSignal {
    GoodForm,
    BadForm,
    /// Model could not judge the frame; keep whatever is displayed.
    Error,
    Unrecognized(String),
}

impl FeedbackSignal {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(text)) => match text.as_str() {
                "Good Form" => FeedbackSignal::GoodForm,
                "Bad Form" => FeedbackSignal::BadForm,
                "Error" => FeedbackSignal::Error,
                other => FeedbackSignal::Unrecognized(other.to_string()),
            },
            Some(other) => FeedbackSignal::Unrecognized(other.to_string()),
            None => FeedbackSignal::Unrecognized(String::new()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FeedbackSignal::GoodForm => "Good Form",
            FeedbackSignal::BadForm => "Bad Form",
            FeedbackSignal::Error => "Error",
            FeedbackSignal::Unrecognized(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackMessage {
    pub signal: FeedbackSignal,
    pub timestamp: Option<i64>,
}

impl FeedbackMessage {
    fn from_payload(payload: &Map<String, Value>) -> Self {
        Self {
            signal: FeedbackSignal::from_value(payload.get("feedback")),
            timestamp: payload.get("timestamp").and_then(Value::as_i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand {
    /// Raw, unvalidated exercise string; the selection policy normalizes it.
    SelectExercise { exercise_type: Option<String> },
    StartWorkout,
    StopWorkout,
    PauseWorkout,
    Unknown(String),
}

impl SystemCommand {
    fn from_payload(payload: &Map<String, Value>) -> Self {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match action {
            "select_exercise" => SystemCommand::SelectExercise {
                exercise_type: payload
                    .get("exerciseType")
                    .or_else(|| payload.get("exercise_type"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "start_workout" => SystemCommand::StartWorkout,
            "stop_workout" => SystemCommand::StopWorkout,
            "pause_workout" => SystemCommand::PauseWorkout,
            other => SystemCommand::Unknown(other.to_string()),
        }
    }
}

/// Every message kind the relay can send, plus a catch-all that keeps the
/// raw frame for the legacy adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    AiFeedback(FeedbackMessage),
    SystemCommand(SystemCommand),
    PerformanceMetrics(PerformanceMetrics),
    BiometricData(PerformanceMetrics),
    Unknown { kind: String, raw: Value },
}

impl InboundMessage {
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::AiFeedback(_) => "ai_feedback",
            InboundMessage::SystemCommand(_) => "system_command",
            InboundMessage::PerformanceMetrics(_) => "performance_metrics",
            InboundMessage::BiometricData(_) => "biometric_data",
            InboundMessage::Unknown { kind, .. } => kind,
        }
    }
}

/// Decodes one inbound text frame (`{ type, payload }`).
pub fn decode_inbound(text: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut frame) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let kind = frame
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    let known = matches!(
        kind.as_str(),
        "ai_feedback" | "system_command" | "performance_metrics" | "biometric_data"
    );
    if !known {
        return Ok(InboundMessage::Unknown {
            kind,
            raw: Value::Object(frame),
        });
    }

    let payload = match frame.remove("payload") {
        Some(Value::Object(map)) => map,
        Some(_) | None => return Err(DecodeError::MissingPayload(kind)),
    };

    let message = match kind.as_str() {
        "ai_feedback" => InboundMessage::AiFeedback(FeedbackMessage::from_payload(&payload)),
        "system_command" => InboundMessage::SystemCommand(SystemCommand::from_payload(&payload)),
        "performance_metrics" => {
            InboundMessage::PerformanceMetrics(metrics_from_payload(&kind, payload)?)
        }
        _ => InboundMessage::BiometricData(metrics_from_payload(&kind, payload)?),
    };
    Ok(message)
}

fn metrics_from_payload(
    kind: &str,
    payload: Map<String, Value>,
) -> Result<PerformanceMetrics, DecodeError> {
    serde_json::from_value(Value::Object(payload)).map_err(|source| DecodeError::BadPayload {
        kind: kind.to_string(),
        source,
    })
}

/// Tolerates relays that send form feedback without the `ai_feedback`
/// envelope. An unknown frame carrying `feedback` or `status` is read as
/// feedback, from `payload` when present, else from the frame itself.
pub fn adapt_legacy_feedback(raw: &Value) -> Option<FeedbackMessage> {
    let frame = raw.as_object()?;
    if !frame.contains_key("feedback") && !frame.contains_key("status") {
        return None;
    }

    let source = frame
        .get("payload")
        .and_then(Value::as_object)
        .unwrap_or(frame);
    Some(FeedbackMessage::from_payload(source))
}
