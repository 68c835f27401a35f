//! Live-update wire protocol.
//!
//! Every frame on the persistent connection is a JSON envelope
//! `{"type": <string>, "payload": <any>}`, in both directions. Inbound frames
//! are decoded into [`ServerEvent`]; outbound control frames are built from
//! [`ClientCommand`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;
use crate::models::{Assignment, AttendanceRecord, RecordId, Submission};

/// Server event type names
pub const ASSIGNMENT_CREATED: &str = "assignment_created";
pub const ASSIGNMENT_UPDATED: &str = "assignment_updated";
pub const SUBMISSION_CREATED: &str = "submission_created";
pub const SUBMISSION_GRADED: &str = "submission_graded";
pub const ATTENDANCE_MARKED: &str = "attendance_marked";

/// The untyped frame carried over the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Parse a text frame. Frames without a non-empty `type` are rejected.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        if envelope.event_type.trim().is_empty() {
            return Err(DecodeError::MissingType);
        }
        Ok(envelope)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceMarked {
    pub subject_id: RecordId,
    #[serde(default)]
    pub records: Vec<AttendanceRecord>,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    AssignmentCreated(Assignment),
    AssignmentUpdated(Assignment),
    SubmissionCreated(Submission),
    SubmissionGraded(Submission),
    AttendanceMarked(AttendanceMarked),
    /// Any type this client does not know about, passed through untouched.
    Unknown { event_type: String, payload: Value },
}

impl ServerEvent {
    /// Decode the payload of an envelope according to its type.
    ///
    /// A known type whose payload does not have the expected shape is an error;
    /// an unrecognised type becomes [`ServerEvent::Unknown`].
    pub fn from_envelope(envelope: Envelope) -> Result<Self, DecodeError> {
        let Envelope {
            event_type,
            payload,
        } = envelope;

        let event = match event_type.as_str() {
            ASSIGNMENT_CREATED => ServerEvent::AssignmentCreated(payload_of(&event_type, payload)?),
            ASSIGNMENT_UPDATED => ServerEvent::AssignmentUpdated(payload_of(&event_type, payload)?),
            SUBMISSION_CREATED => ServerEvent::SubmissionCreated(payload_of(&event_type, payload)?),
            SUBMISSION_GRADED => ServerEvent::SubmissionGraded(payload_of(&event_type, payload)?),
            ATTENDANCE_MARKED => ServerEvent::AttendanceMarked(payload_of(&event_type, payload)?),
            _ => ServerEvent::Unknown {
                event_type,
                payload,
            },
        };
        Ok(event)
    }

    /// Parse and decode a text frame in one step.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        Self::from_envelope(Envelope::parse(text)?)
    }

    /// The wire type name this event was decoded from.
    pub fn event_type(&self) -> &str {
        match self {
            ServerEvent::AssignmentCreated(_) => ASSIGNMENT_CREATED,
            ServerEvent::AssignmentUpdated(_) => ASSIGNMENT_UPDATED,
            ServerEvent::SubmissionCreated(_) => SUBMISSION_CREATED,
            ServerEvent::SubmissionGraded(_) => SUBMISSION_GRADED,
            ServerEvent::AttendanceMarked(_) => ATTENDANCE_MARKED,
            ServerEvent::Unknown { event_type, .. } => event_type,
        }
    }
}

fn payload_of<T: serde::de::DeserializeOwned>(
    event_type: &str,
    payload: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|source| DecodeError::Payload {
        event_type: event_type.to_string(),
        source,
    })
}

/// Control messages the client sends to manage per-entity update streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientCommand {
    SubscribeAssignment { assignment_id: RecordId },
    UnsubscribeAssignment { assignment_id: RecordId },
    SubscribeAttendance { subject_id: RecordId },
    UnsubscribeAttendance { subject_id: RecordId },
}

impl ClientCommand {
    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn control_message_matches_wire_shape() {
        let cmd = ClientCommand::SubscribeAssignment { assignment_id: 42 };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            json!({"type": "subscribe_assignment", "payload": {"assignment_id": 42}})
        );

        let envelope = ClientCommand::SubscribeAttendance { subject_id: 3 }
            .to_envelope()
            .unwrap();
        assert_eq!(envelope.event_type, "subscribe_attendance");
        assert_eq!(envelope.payload, json!({"subject_id": 3}));
    }

    #[test]
    fn rejects_missing_or_empty_type() {
        assert!(matches!(
            Envelope::parse(r#"{"type": "", "payload": {}}"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(
            Envelope::parse(r#"{"payload": {}}"#),
            Err(DecodeError::Json(_))
        ));
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn unknown_types_fall_through_with_payload() {
        let event = ServerEvent::parse(r#"{"type": "announcement", "payload": {"text": "hi"}}"#)
            .unwrap();
        assert_eq!(event.event_type(), "announcement");
        match event {
            ServerEvent::Unknown { payload, .. } => assert_eq!(payload["text"], "hi"),
            other => panic!("expected unknown event, got {other:?}"),
        }
    }

    #[test]
    fn known_type_with_wrong_payload_is_an_error() {
        let err = ServerEvent::parse(r#"{"type": "submission_graded", "payload": {"id": "x"}}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Payload { ref event_type, .. } if event_type == SUBMISSION_GRADED));
    }

    #[test]
    fn decodes_graded_submission() {
        let text = json!({
            "type": "submission_graded",
            "payload": {
                "id": 9,
                "assignment_id": 4,
                "student_id": 12,
                "file_path": "uploads/12_4_report.pdf",
                "grade": "A",
                "feedback": "Well argued"
            }
        })
        .to_string();
        match ServerEvent::parse(&text).unwrap() {
            ServerEvent::SubmissionGraded(submission) => {
                assert_eq!(submission.id, 9);
                assert_eq!(submission.grade.as_deref(), Some("A"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
