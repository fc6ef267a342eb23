//! Treal machines over USB HID
//!
//! The Treal sends a 5-byte report whenever its key state changes. Keys are
//! ORed together until an all-zero report ends the chord.

use hidapi::{HidApi, HidDevice};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::MachineDescriptor;
use super::transport::{RawEvent, Transport, TransportError};
use super::MachineOptions;
use crate::keymap::MachineInfo;

pub const VENDOR_ID: u16 = 0x0DC6;
pub const PRODUCT_IDS: std::ops::RangeInclusive<u16> = 1..=10;

const REPORT_SIZE: usize = 5;
const READ_TIMEOUT_MS: i32 = 50;

/// Symbols per report byte, most significant bit first
const STENO_KEY_CHART: [[&str; 8]; REPORT_SIZE] = [
    ["K-", "W-", "R-", "*2", "-R", "-B", "-G", "-S"],
    ["*1", "-F", "-P", "-L", "-T", "-D", "X2-", "S2-"],
    ["#9", "#A", "#B", "X1-", "S1-", "T-", "P-", "H-"],
    ["#1", "#2", "#3", "#4", "#5", "#6", "#7", "#8"],
    ["", "", "-Z", "A-", "O-", "X3", "-E", "-U"],
];

const KEYS: &[&str] = &[
    "#1", "#2", "#3", "#4", "#5", "#6", "#7", "#8", "#9", "#A", "#B", "X1-", "S1-", "T-", "P-",
    "H-", "*1", "-F", "-P", "-L", "-T", "-D", "X2-", "S2-", "K-", "W-", "R-", "*2", "-R", "-B",
    "-G", "-S", "-Z", "A-", "O-", "X3", "-E", "-U",
];

pub const DESCRIPTOR: MachineDescriptor = MachineDescriptor::new(
    MachineInfo {
        name: "Treal",
        keys: KEYS,
        actions: &[],
        keymap_fallback: None,
    },
    build,
);

fn build(_options: &MachineOptions) -> Box<dyn Transport> {
    Box::new(TrealTransport::default())
}

/// Keys set in a report
pub fn report_keys(report: &[u8; REPORT_SIZE]) -> Vec<&'static str> {
    let mut keys = Vec::new();
    for (byte, symbols) in report.iter().zip(STENO_KEY_CHART.iter()) {
        for (i, symbol) in symbols.iter().enumerate() {
            if byte >> (7 - i) & 1 == 1 && !symbol.is_empty() {
                keys.push(*symbol);
            }
        }
    }
    keys
}

/// ORs reports together until the machine reports no keys down
#[derive(Debug, Default)]
pub struct ChordAccumulator {
    pressed: [u8; REPORT_SIZE],
}

impl ChordAccumulator {
    /// Feed one report; returns the chord when it completes
    pub fn update(&mut self, report: [u8; REPORT_SIZE]) -> Option<Vec<&'static str>> {
        if report != [0; REPORT_SIZE] {
            for (pressed, byte) in self.pressed.iter_mut().zip(report) {
                *pressed |= byte;
            }
            return None;
        }
        let chord = std::mem::take(&mut self.pressed);
        let keys = report_keys(&chord);
        (!keys.is_empty()).then_some(keys)
    }

    pub fn reset(&mut self) {
        self.pressed = [0; REPORT_SIZE];
    }
}

#[derive(Default)]
pub struct TrealTransport {
    device: Option<HidDevice>,
    chord: ChordAccumulator,
}

impl Transport for TrealTransport {
    fn connect(&mut self, _cancel: &CancellationToken) -> Result<(), TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::Unavailable(e.to_string()))?;
        for product_id in PRODUCT_IDS {
            if let Ok(device) = api.open(VENDOR_ID, product_id) {
                device
                    .set_blocking_mode(true)
                    .map_err(|e| TransportError::Io(e.to_string()))?;
                debug!(product_id, "treal opened");
                self.device = Some(device);
                self.chord.reset();
                return Ok(());
            }
        }
        Err(TransportError::NotFound)
    }

    fn poll(&mut self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, TransportError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| TransportError::Io("not connected".to_string()))?;
        let mut report = [0u8; REPORT_SIZE];
        let n = device
            .read_timeout(&mut report, READ_TIMEOUT_MS)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        if n != REPORT_SIZE {
            return Ok(Vec::new());
        }
        Ok(self
            .chord
            .update(report)
            .map(RawEvent::chord)
            .into_iter()
            .collect())
    }

    fn disconnect(&mut self) {
        self.device = None;
        self.chord.reset();
    }
}
