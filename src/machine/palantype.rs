//! Palantype machines over a serial port

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::registry::MachineDescriptor;
use super::supervisor::sleep_cancellable;
use super::transport::{RawEvent, Transport, TransportError};
use super::MachineOptions;
use crate::keymap::MachineInfo;

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Puts the machine into realtime mode
const REALTIME_COMMANDS: [u8; 5] = [0x81, 0x91, 0x90, 0x93, 0xAA];
const COMMAND_INTERVAL: Duration = Duration::from_millis(500);
/// Asks for buffered strokes
const REQUEST_READ: u8 = 0x80;
const REQUEST_INTERVAL: Duration = Duration::from_millis(200);
/// Leaves realtime mode
const END: u8 = 0x95;

const READ_TIMEOUT: Duration = Duration::from_millis(50);
const FRAME_SIZE: usize = 5;

/// Symbols per frame byte, most significant bit first; keys are active low
const STENO_KEY_CHART: [[&str; 8]; 4] = [
    ["M-", "+2-", "+1-", "H-", "T-", "P-", "S-", "C-"],
    ["-A", "E-", "O-", "Y-", "L-", "N-", "R-", "F-"],
    ["-M", "-C", "-L", "-N", "-^2", "-^1", "I", "-U"],
    ["", "-S", "-H", "-+", "-T", "-P", "-R", "-F"],
];

const KEYS: &[&str] = &[
    "P-", "M-", "N-", "-N", "-M", "-P", "C-", "T-", "F-", "L-", "-L", "-F", "-T", "-H", "S-", "H-",
    "R-", "Y-", "O-", "I", "-A", "-C", "-R", "-+", "-S", "+1-", "+2-", "E-", "-U", "-^1", "-^2",
];

pub const DESCRIPTOR: MachineDescriptor = MachineDescriptor::new(
    MachineInfo {
        name: "Palantype",
        keys: KEYS,
        actions: &[],
        keymap_fallback: None,
    },
    build,
);

fn build(options: &MachineOptions) -> Box<dyn Transport> {
    Box::new(PalantypeTransport::new(
        options.serial_port.clone(),
        options.baud_rate,
    ))
}

/// Keys held in the 4 data bytes of a frame
pub fn parse_frame(data: &[u8]) -> Vec<&'static str> {
    let mut keys = Vec::new();
    for (byte, symbols) in data.iter().zip(STENO_KEY_CHART.iter()) {
        for (i, symbol) in symbols.iter().enumerate() {
            if byte >> (7 - i) & 1 == 0 && !symbol.is_empty() {
                keys.push(*symbol);
            }
        }
    }
    keys
}

/// Take every complete frame from `buffer`, leaving any partial frame
///
/// The first byte of each frame carries no keys.
pub fn drain_frames(buffer: &mut Vec<u8>) -> Vec<Vec<&'static str>> {
    let complete = buffer.len() - buffer.len() % FRAME_SIZE;
    let chords = buffer[..complete]
        .chunks_exact(FRAME_SIZE)
        .map(|frame| parse_frame(&frame[1..]))
        .filter(|keys| !keys.is_empty())
        .collect();
    buffer.drain(..complete);
    chords
}

pub struct PalantypeTransport {
    port_name: Option<String>,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
    last_request: Option<Instant>,
}

impl PalantypeTransport {
    pub fn new(port_name: Option<String>, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            port: None,
            pending: Vec::new(),
            last_request: None,
        }
    }

    fn port_name(&self) -> Result<String, TransportError> {
        if let Some(name) = &self.port_name {
            return Ok(name.clone());
        }
        let ports =
            serialport::available_ports().map_err(|e| TransportError::Unavailable(e.to_string()))?;
        ports
            .into_iter()
            .next()
            .map(|p| p.port_name)
            .ok_or(TransportError::NotFound)
    }
}

fn serial_error(e: serialport::Error) -> TransportError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => TransportError::NotFound,
        serialport::ErrorKind::Io(kind) => TransportError::from(std::io::Error::new(kind, e)),
        _ => TransportError::Io(e.to_string()),
    }
}

impl Transport for PalantypeTransport {
    fn connect(&mut self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let name = self.port_name()?;
        let mut port = serialport::new(&name, self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(serial_error)?;
        for command in REALTIME_COMMANDS {
            port.write_all(&[command])?;
            if !sleep_cancellable(COMMAND_INTERVAL, cancel) {
                return Err(TransportError::Io("cancelled during handshake".to_string()));
            }
        }
        debug!(port = %name, baud = self.baud_rate, "palantype in realtime mode");
        self.port = Some(port);
        self.pending.clear();
        self.last_request = None;
        Ok(())
    }

    fn poll(&mut self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, TransportError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::Io("not connected".to_string()))?;

        let waiting = port.bytes_to_read().map_err(serial_error)?;
        let due = self
            .last_request
            .map_or(true, |at| at.elapsed() >= REQUEST_INTERVAL);
        if waiting == 0 && due {
            port.write_all(&[REQUEST_READ])?;
            self.last_request = Some(Instant::now());
        }

        let mut buf = [0u8; 64];
        match port.read(&mut buf) {
            Ok(n) => self.pending.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }
        Ok(drain_frames(&mut self.pending)
            .into_iter()
            .map(RawEvent::chord)
            .collect())
    }

    fn disconnect(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.write_all(&[END]) {
                warn!(%e, "failed to take palantype out of realtime mode");
            }
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_active_low() {
        assert!(parse_frame(&[0xFF; 4]).is_empty());
        assert_eq!(parse_frame(&[0x7F, 0xFF, 0xFF, 0xFF]), vec!["M-"]);
        assert_eq!(parse_frame(&[0xFF, 0xFF, 0xFE, 0xBF]), vec!["-U", "-S"]);
        // The unused high bit of the last byte never yields a key
        assert!(parse_frame(&[0xFF, 0xFF, 0xFF, 0x7F]).is_empty());
    }

    #[test]
    fn test_frames_drop_first_byte() {
        let mut buffer = vec![0x00, 0x7F, 0xFF, 0xFF, 0xFF, 0xAB, 0xFF, 0xFF, 0xFF, 0xFE, 0x00, 0x7F];
        let chords = drain_frames(&mut buffer);
        assert_eq!(chords, vec![vec!["M-"], vec!["-F"]]);
        assert_eq!(buffer, vec![0x00, 0x7F]);
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        let mut buffer = vec![0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(drain_frames(&mut buffer).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_every_chart_symbol_is_a_key() {
        for symbol in STENO_KEY_CHART.iter().flatten().filter(|s| !s.is_empty()) {
            assert!(KEYS.contains(symbol), "{}", symbol);
        }
        assert_eq!(KEYS.len(), 31);
    }
}
