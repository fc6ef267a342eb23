//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::{MachineEvent, MachineState};
use crate::machine::DriverError;
use crate::output::EmitError;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Most backspaces one request may send
pub const MAX_BACKSPACES: usize = 1000;

/// Requests from a client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to stroke and machine state notifications
    Subscribe,

    StartCapture,

    StopCapture,

    SendKeyCombination { combo: String },

    SendString { text: String },

    SendBackspaces { count: usize },
}

/// Responses from the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Command carried out
    Ok,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl ToString) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<DriverError> for Response {
    fn from(e: DriverError) -> Self {
        let code = match e {
            DriverError::AlreadyRunning => "already_running",
            DriverError::UnknownMachine(_) => "unknown_machine",
            DriverError::ThreadSpawn(_) => "capture_failed",
        };
        Self::error(code, e)
    }
}

impl From<EmitError> for Response {
    fn from(e: EmitError) -> Self {
        let code = match e {
            EmitError::Combo(_) => "invalid_key_combination",
            EmitError::Backend(_) => "output_failed",
            EmitError::Unavailable(_) => "output_unavailable",
        };
        Self::error(code, e)
    }
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    MachineEvent { event: MachineEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    pub machine_type: String,

    pub system: String,

    pub state: MachineState,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

/// Length-prefixed JSON frame for a message
pub fn encode_frame<T: Serialize>(msg: &T) -> serde_json::Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Stroke;
    use crate::keycombo::{KeyComboError, NameCombo};

    #[test]
    fn test_request_serialization() {
        let req = Request::SendKeyCombination {
            combo: "Alt_L(Tab)".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"send_key_combination","combo":"Alt_L(Tab)"}"#);

        let req: Request = serde_json::from_str(r#"{"type":"send_backspaces","count":3}"#).unwrap();
        assert_eq!(req, Request::SendBackspaces { count: 3 });
        assert!(serde_json::from_str::<Request>(r#"{"type":"set_mode"}"#).is_err());
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus {
            version: "0.1.0".to_string(),
            machine_type: "Keyboard".to_string(),
            system: "English Stenotype".to_string(),
            state: MachineState::Connected,
            uptime_secs: 5,
        });
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.starts_with(r#"{"type":"status","#));
        assert!(json.contains(r#""state":"connected""#));
        assert_eq!(serde_json::to_string(&Response::Ok).unwrap(), r#"{"type":"ok"}"#);
    }

    #[test]
    fn test_error_codes() {
        let err: KeyComboError = NameCombo::by_name().parse("a)").unwrap_err();
        let Response::Error { code, message } = Response::from(EmitError::Combo(err)) else {
            panic!("expected an error response");
        };
        assert_eq!(code, "invalid_key_combination");
        assert!(!message.is_empty());

        assert_eq!(
            Response::from(DriverError::AlreadyRunning),
            Response::error("already_running", DriverError::AlreadyRunning)
        );
    }

    #[test]
    fn test_notification_frame() {
        let notification = Notification::MachineEvent {
            event: MachineEvent::Stroke {
                keys: Stroke::new(vec!["S-".to_string()]).unwrap(),
            },
        };
        let frame = encode_frame(&notification).unwrap();
        let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
        assert_eq!(
            std::str::from_utf8(&frame[4..]).unwrap(),
            r#"{"type":"machine_event","event":{"type":"stroke","keys":["S-"]}}"#
        );
    }
}
