//! Keyboard capture from Linux input devices
//!
//! Reads every keyboard under /dev/input. While any key is suppressed the
//! keyboards are grabbed and every other key is passed on through a
//! uinput device.

use std::collections::HashSet;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::PathBuf;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, Device, InputEvent, InputEventKind, Key};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::machine::{RawEvent, Transport, TransportError};
use crate::output::{KeyLayout, Platform};

const POLL_TIMEOUT_MS: u16 = 50;

/// Name of the uinput device carrying keys that are not suppressed
const PASSTHROUGH_NAME: &str = "stenod passthrough";

const KEY_RELEASE: i32 = 0;
const KEY_PRESS: i32 = 1;

/// Whether a device looks like a full keyboard
fn is_keyboard(device: &Device) -> bool {
    device
        .supported_keys()
        .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_SPACE))
}

/// Open every keyboard, reporting if any was refused
fn find_keyboards() -> (Vec<(PathBuf, Device)>, bool) {
    let mut keyboards = Vec::new();
    let mut denied = false;
    let Ok(entries) = std::fs::read_dir("/dev/input") else {
        return (keyboards, denied);
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_event_node = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("event"));
        if !is_event_node {
            continue;
        }
        match Device::open(&path) {
            Ok(device) if device.name() == Some(PASSTHROUGH_NAME) => {}
            Ok(device) if is_keyboard(&device) => keyboards.push((path, device)),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => denied = true,
            Err(e) => debug!(path = %path.display(), %e, "skipping input device"),
        }
    }
    (keyboards, denied)
}

/// Raw key event for an evdev key code and value
fn key_event(layout: &KeyLayout, code: u16, value: i32) -> Option<RawEvent> {
    let name = layout.machine_key(code)?.to_string();
    match value {
        KEY_PRESS => Some(RawEvent::KeyDown(name)),
        KEY_RELEASE => Some(RawEvent::KeyUp(name)),
        // Autorepeat
        _ => None,
    }
}

/// Split a batch into captured events and events to pass on
///
/// Nothing is passed on unless the devices are grabbed.
fn route_batch(
    layout: &KeyLayout,
    suppressed: &HashSet<u16>,
    grabbed: bool,
    batch: impl IntoIterator<Item = InputEvent>,
) -> (Vec<RawEvent>, Vec<InputEvent>) {
    let mut captured = Vec::new();
    let mut passed = Vec::new();
    for event in batch {
        let InputEventKind::Key(key) = event.kind() else {
            continue;
        };
        captured.extend(key_event(layout, key.code(), event.value()));
        if grabbed && !suppressed.contains(&key.code()) {
            passed.push(event);
        }
    }
    (captured, passed)
}

pub struct EvdevCapture {
    layout: KeyLayout,
    devices: Vec<(PathBuf, Device)>,
    suppressed: HashSet<u16>,
    passthrough: Option<VirtualDevice>,
}

impl EvdevCapture {
    pub fn new() -> Self {
        Self {
            layout: KeyLayout::new(Platform::Evdev),
            devices: Vec::new(),
            suppressed: HashSet::new(),
            passthrough: None,
        }
    }

    fn grab(&mut self) -> std::io::Result<()> {
        let mut keys = AttributeSet::<Key>::new();
        for (_, device) in &self.devices {
            if let Some(supported) = device.supported_keys() {
                for key in supported.iter() {
                    keys.insert(key);
                }
            }
        }
        let passthrough = VirtualDeviceBuilder::new()?
            .name(PASSTHROUGH_NAME)
            .with_keys(&keys)?
            .build()?;
        let grabbed = self.devices.iter_mut().try_for_each(|(path, device)| {
            device.grab().inspect_err(|e| {
                warn!(path = %path.display(), %e, "failed to grab keyboard");
            })
        });
        if let Err(e) = grabbed {
            self.ungrab();
            return Err(e);
        }
        self.passthrough = Some(passthrough);
        Ok(())
    }

    fn ungrab(&mut self) {
        for (path, device) in &mut self.devices {
            if let Err(e) = device.ungrab() {
                debug!(path = %path.display(), %e, "ungrab failed");
            }
        }
        self.passthrough = None;
    }
}

impl Transport for EvdevCapture {
    fn connect(&mut self, _cancel: &CancellationToken) -> Result<(), TransportError> {
        let (devices, denied) = find_keyboards();
        if devices.is_empty() {
            return Err(if denied {
                TransportError::Unavailable(
                    "no readable keyboard; add the user to the input group".to_string(),
                )
            } else {
                TransportError::NotFound
            });
        }
        for (path, device) in &devices {
            info!(path = %path.display(), name = device.name().unwrap_or("unknown"), "capturing keyboard");
        }
        self.devices = devices;
        Ok(())
    }

    fn poll(&mut self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, TransportError> {
        if self.devices.is_empty() {
            return Err(TransportError::Io("not connected".to_string()));
        }

        let ready: Vec<bool> = {
            // SAFETY: the devices outlive these borrowed descriptors
            let mut fds: Vec<PollFd> = self
                .devices
                .iter()
                .map(|(_, device)| unsafe {
                    PollFd::new(BorrowedFd::borrow_raw(device.as_raw_fd()), PollFlags::POLLIN)
                })
                .collect();
            match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(0) | Err(Errno::EINTR) => return Ok(Vec::new()),
                Ok(_) => {}
                Err(e) => return Err(TransportError::Io(e.to_string())),
            }
            fds.iter()
                .map(|fd| fd.revents().is_some_and(|r| !r.is_empty()))
                .collect()
        };

        let grabbed = self.passthrough.is_some();
        let mut events = Vec::new();
        for ((path, device), ready) in self.devices.iter_mut().zip(ready) {
            if !ready {
                continue;
            }
            let (captured, passed) = match device.fetch_events() {
                Ok(batch) => route_batch(&self.layout, &self.suppressed, grabbed, batch),
                Err(e) => {
                    warn!(path = %path.display(), %e, "keyboard read failed");
                    return Err(e.into());
                }
            };
            events.extend(captured);
            if let (Some(passthrough), false) = (self.passthrough.as_mut(), passed.is_empty()) {
                passthrough.emit(&passed)?;
            }
        }
        Ok(events)
    }

    fn disconnect(&mut self) {
        self.ungrab();
        self.devices.clear();
    }

    fn suppress(&mut self, keys: &[String]) {
        self.suppressed = keys
            .iter()
            .filter_map(|name| self.layout.machine_keycode(name))
            .collect();
        debug!(count = self.suppressed.len(), "suppressing keys");
        match (self.suppressed.is_empty(), self.passthrough.is_some()) {
            (false, false) => {
                if let Err(e) = self.grab() {
                    warn!(%e, "cannot suppress keys, they will also reach other applications");
                }
            }
            (true, true) => self.ungrab(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    #[test]
    fn test_key_events() {
        let layout = KeyLayout::new(Platform::Evdev);
        assert_eq!(
            key_event(&layout, Key::KEY_Q.code(), KEY_PRESS),
            Some(RawEvent::KeyDown("q".to_string()))
        );
        assert_eq!(
            key_event(&layout, Key::KEY_SPACE.code(), KEY_RELEASE),
            Some(RawEvent::KeyUp("space".to_string()))
        );
        assert_eq!(key_event(&layout, Key::KEY_Q.code(), 2), None);
        assert_eq!(key_event(&layout, Key::KEY_LEFTSHIFT.code(), KEY_PRESS), None);
    }

    #[test]
    fn test_suppressed_keys_are_not_passed_on() {
        let layout = KeyLayout::new(Platform::Evdev);
        let suppressed: HashSet<u16> = [Key::KEY_Q.code()].into_iter().collect();
        let key = |key: Key, value| InputEvent::new(EventType::KEY, key.code(), value);
        let batch = vec![
            key(Key::KEY_Q, KEY_PRESS),
            key(Key::KEY_W, KEY_PRESS),
            key(Key::KEY_W, 2),
            InputEvent::new(EventType::SYNCHRONIZATION, 0, 0),
            key(Key::KEY_LEFTSHIFT, KEY_RELEASE),
            key(Key::KEY_Q, KEY_RELEASE),
        ];

        let (captured, passed) = route_batch(&layout, &suppressed, true, batch.clone());
        assert_eq!(
            captured,
            vec![
                RawEvent::KeyDown("q".to_string()),
                RawEvent::KeyDown("w".to_string()),
                RawEvent::KeyUp("q".to_string()),
            ]
        );
        let passed: Vec<(u16, i32)> = passed.iter().map(|e| (e.code(), e.value())).collect();
        assert_eq!(
            passed,
            vec![
                (Key::KEY_W.code(), KEY_PRESS),
                (Key::KEY_W.code(), 2),
                (Key::KEY_LEFTSHIFT.code(), KEY_RELEASE),
            ]
        );

        let (captured, passed) = route_batch(&layout, &suppressed, false, batch);
        assert_eq!(captured.len(), 3);
        assert!(passed.is_empty());
    }
}
