//! Stenograph writers over USB bulk transfers

use std::io;
use std::time::Duration;

use rusb::{DeviceHandle, Direction, GlobalContext, TransferType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::MachineDescriptor;
use super::supervisor::sleep_cancellable;
use super::transport::{RawEvent, Transport, TransportError};
use super::MachineOptions;
use crate::keymap::MachineInfo;
use crate::protocol::{PacketLink, ProtocolError, StenographSession, STENOGRAPH_KEYS};

pub const VENDOR_ID: u16 = 0x112B;

const INTERFACE: u8 = 0;
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);
/// Pause between reads that returned nothing
const IDLE_DELAY: Duration = Duration::from_millis(10);

pub const DESCRIPTOR: MachineDescriptor = MachineDescriptor::new(
    MachineInfo {
        name: "Stenograph",
        keys: &STENOGRAPH_KEYS,
        actions: &[],
        keymap_fallback: None,
    },
    build,
);

fn build(_options: &MachineOptions) -> Box<dyn Transport> {
    Box::new(StenographTransport::default())
}

fn usb_error(e: rusb::Error) -> TransportError {
    match e {
        rusb::Error::NoDevice | rusb::Error::NotFound => TransportError::NotFound,
        rusb::Error::Access | rusb::Error::NotSupported => {
            TransportError::Unavailable(e.to_string())
        }
        other => TransportError::Io(other.to_string()),
    }
}

fn link_error(e: rusb::Error) -> io::Error {
    let kind = match e {
        rusb::Error::NoDevice | rusb::Error::NotFound => io::ErrorKind::NotFound,
        rusb::Error::Access => io::ErrorKind::PermissionDenied,
        rusb::Error::Pipe | rusb::Error::Io => io::ErrorKind::BrokenPipe,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e)
}

/// Claimed bulk endpoints of a writer; the interface is released on drop
struct UsbLink {
    handle: DeviceHandle<GlobalContext>,
    endpoint_in: u8,
    endpoint_out: u8,
}

impl UsbLink {
    fn open() -> Result<Self, TransportError> {
        let devices = rusb::devices().map_err(usb_error)?;
        let device = devices
            .iter()
            .find(|d| {
                d.device_descriptor()
                    .map(|desc| desc.vendor_id() == VENDOR_ID)
                    .unwrap_or(false)
            })
            .ok_or(TransportError::NotFound)?;

        let config = device.active_config_descriptor().map_err(usb_error)?;
        let mut endpoint_in = None;
        let mut endpoint_out = None;
        for interface in config.interfaces() {
            for setting in interface.descriptors() {
                if setting.interface_number() != INTERFACE || setting.setting_number() != 0 {
                    continue;
                }
                for endpoint in setting.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Bulk {
                        continue;
                    }
                    match endpoint.direction() {
                        Direction::In => endpoint_in = endpoint_in.or(Some(endpoint.address())),
                        Direction::Out => endpoint_out = endpoint_out.or(Some(endpoint.address())),
                    }
                }
            }
        }
        let (Some(endpoint_in), Some(endpoint_out)) = (endpoint_in, endpoint_out) else {
            return Err(TransportError::Io("writer has no bulk endpoints".to_string()));
        };

        let handle = device.open().map_err(usb_error)?;
        // Not every platform supports detaching
        let _ = handle.set_auto_detach_kernel_driver(true);
        handle.claim_interface(INTERFACE).map_err(usb_error)?;
        debug!(
            bus = device.bus_number(),
            address = device.address(),
            endpoint_in,
            endpoint_out,
            "stenograph interface claimed"
        );
        Ok(Self {
            handle,
            endpoint_in,
            endpoint_out,
        })
    }
}

impl PacketLink for UsbLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.handle
            .write_bulk(self.endpoint_out, bytes, WRITE_TIMEOUT)
            .map_err(link_error)?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        match self.handle.read_bulk(self.endpoint_in, buf, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(e) => Err(link_error(e)),
        }
    }
}

impl Drop for UsbLink {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(INTERFACE);
    }
}

fn session_error(e: ProtocolError) -> TransportError {
    match e {
        ProtocolError::Io(e) => TransportError::from(e),
        other => TransportError::Io(other.to_string()),
    }
}

#[derive(Default)]
pub struct StenographTransport {
    session: Option<StenographSession<UsbLink>>,
}

impl Transport for StenographTransport {
    fn connect(&mut self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let mut session = StenographSession::new(UsbLink::open()?);
        if !session.open_realtime(cancel).map_err(session_error)? {
            info!("writer has no realtime file yet, will keep asking");
        }
        self.session = Some(session);
        Ok(())
    }

    fn poll(&mut self, cancel: &CancellationToken) -> Result<Vec<RawEvent>, TransportError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| TransportError::Io("not connected".to_string()))?;
        let chords = match session.poll(cancel) {
            Ok(chords) => chords,
            Err(ProtocolError::Cancelled) => return Ok(Vec::new()),
            Err(e) => return Err(session_error(e)),
        };
        if chords.is_empty() {
            sleep_cancellable(IDLE_DELAY, cancel);
        }
        Ok(chords.into_iter().map(RawEvent::chord).collect())
    }

    fn disconnect(&mut self) {
        self.session = None;
    }
}
