//! Hardware transport capability

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Input from a machine, in raw key names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    KeyDown(String),
    KeyUp(String),
    /// A complete chord from hardware that reports whole strokes
    Chord(Vec<String>),
}

impl RawEvent {
    pub fn chord<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chord(keys.into_iter().map(Into::into).collect())
    }
}

/// Errors from machine transports
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("machine not found")]
    NotFound,

    #[error("machine I/O failed: {0}")]
    Io(String),

    /// Missing permission or driver; retrying will not help
    #[error("machine unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Whether a reconnect attempt may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::Unavailable(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

/// A way of talking to one kind of machine
///
/// Implementations own the hardware handle between `connect` and
/// `disconnect`. Every blocking call waits at most ~100ms and honours the
/// cancellation token.
pub trait Transport: Send {
    /// Open the hardware and perform any handshake
    fn connect(&mut self, cancel: &CancellationToken) -> Result<(), TransportError>;

    /// Wait briefly for input; an empty batch means nothing arrived
    fn poll(&mut self, cancel: &CancellationToken) -> Result<Vec<RawEvent>, TransportError>;

    /// Release the hardware handle; safe to call when not connected
    fn disconnect(&mut self);

    /// Keep these raw keys from reaching the rest of the system
    fn suppress(&mut self, _keys: &[String]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(TransportError::NotFound.is_transient());
        assert!(TransportError::Io("pipe".to_string()).is_transient());
        assert!(!TransportError::Unavailable("no driver".to_string()).is_transient());

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(!TransportError::from(denied).is_transient());
        let gone = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(matches!(TransportError::from(gone), TransportError::NotFound));
    }
}
