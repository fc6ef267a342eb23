//! Machine events: state changes and strokes
//!
//! Drivers hand events to the daemon over an unbounded channel; listeners
//! only ever run on the receiving side of that channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Driver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    #[default]
    Stopped,
    /// Connecting to the hardware
    Initializing,
    Connected,
    /// Lost the hardware, a reconnect is pending
    Disconnected,
    /// Handshake failed or hardware unavailable; needs an explicit restart
    Error,
}

impl MachineState {
    /// Whether a capture worker is alive in this state
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Stopped | Self::Error)
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineState::Stopped => write!(f, "stopped"),
            MachineState::Initializing => write!(f, "initializing"),
            MachineState::Connected => write!(f, "connected"),
            MachineState::Disconnected => write!(f, "disconnected"),
            MachineState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a stroke needs at least one key")]
pub struct EmptyStroke;

/// Steno keys pressed together, in steno order; never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Stroke {
    keys: Vec<String>,
}

impl Stroke {
    pub fn new(keys: Vec<String>) -> Result<Self, EmptyStroke> {
        if keys.is_empty() {
            return Err(EmptyStroke);
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl TryFrom<Vec<String>> for Stroke {
    type Error = EmptyStroke;

    fn try_from(keys: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(keys)
    }
}

impl From<Stroke> for Vec<String> {
    fn from(stroke: Stroke) -> Self {
        stroke.keys
    }
}

impl std::fmt::Display for Stroke {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keys.join(" "))
    }
}

/// Events emitted by a machine driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MachineEvent {
    StateChanged {
        machine_type: String,
        state: MachineState,
    },
    Stroke {
        keys: Stroke,
    },
}

impl std::fmt::Display for MachineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineEvent::StateChanged {
                machine_type,
                state,
            } => write!(f, "{} {}", machine_type, state),
            MachineEvent::Stroke { keys } => write!(f, "STROKE ({})", keys),
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<MachineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<MachineEvent>;

/// Create the driver → daemon handoff channel
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Receives machine notifications
pub trait MachineListener: Send {
    /// Called at most once per chord
    fn on_stroke(&mut self, stroke: &Stroke);

    fn on_state(&mut self, machine_type: &str, state: MachineState);
}

/// Deliver events to a listener until every sender is gone
pub async fn dispatch<L: MachineListener>(mut rx: EventReceiver, listener: &mut L) {
    while let Some(event) = rx.recv().await {
        match &event {
            MachineEvent::StateChanged {
                machine_type,
                state,
            } => listener.on_state(machine_type, *state),
            MachineEvent::Stroke { keys } => listener.on_stroke(keys),
        }
    }
    debug!("machine event channel closed");
}

/// Listener that logs strokes and republishes events to subscribers
pub struct EventFanout {
    log_strokes: bool,
    subscribers: broadcast::Sender<MachineEvent>,
}

impl EventFanout {
    pub fn new(log_strokes: bool, subscribers: broadcast::Sender<MachineEvent>) -> Self {
        Self {
            log_strokes,
            subscribers,
        }
    }

    fn publish(&self, event: MachineEvent) {
        // No subscribers is fine
        let _ = self.subscribers.send(event);
    }
}

impl MachineListener for EventFanout {
    fn on_stroke(&mut self, stroke: &Stroke) {
        if self.log_strokes {
            info!(target: "stenod::strokes", stroke = %stroke, "stroke");
        }
        self.publish(MachineEvent::Stroke {
            keys: stroke.clone(),
        });
    }

    fn on_state(&mut self, machine_type: &str, state: MachineState) {
        info!(machine = machine_type, %state, "machine state");
        self.publish(MachineEvent::StateChanged {
            machine_type: machine_type.to_string(),
            state,
        });
    }
}
