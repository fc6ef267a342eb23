//! Keyboard capture and emulation using macOS Quartz events
//!
//! Capture runs a CGEventTap on a dedicated thread with its own CFRunLoop.
//! The tap callback must return quickly, so key events are forwarded over
//! a channel and the transport drains it on poll.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, EventField,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::machine::{RawEvent, Transport, TransportError};
use crate::output::{EmitError, KeyLayout, KeyOutput, Modifiers, Platform};

/// Stamped on posted events so the tap lets them through
const INJECTED_MARKER: i64 = 0x5354_454E;

const RUN_LOOP_SLICE: Duration = Duration::from_millis(100);
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Flags that do not stop a key from being captured
fn capturable_flags() -> CGEventFlags {
    CGEventFlags::CGEventFlagNumericPad
        | CGEventFlags::CGEventFlagSecondaryFn
        | CGEventFlags::CGEventFlagNonCoalesced
}

fn modifier_flags() -> CGEventFlags {
    CGEventFlags::CGEventFlagShift
        | CGEventFlags::CGEventFlagControl
        | CGEventFlags::CGEventFlagAlternate
        | CGEventFlags::CGEventFlagCommand
}

/// Keyboard capture through a session event tap
pub struct TapCapture {
    suppressed: Arc<RwLock<HashSet<u16>>>,
    running: Arc<AtomicBool>,
    events: Option<mpsc::Receiver<RawEvent>>,
    thread: Option<JoinHandle<()>>,
}

impl TapCapture {
    pub fn new() -> Self {
        Self {
            suppressed: Arc::new(RwLock::new(HashSet::new())),
            running: Arc::new(AtomicBool::new(false)),
            events: None,
            thread: None,
        }
    }
}

impl Transport for TapCapture {
    fn connect(&mut self, _cancel: &CancellationToken) -> Result<(), TransportError> {
        self.disconnect();
        self.running.store(true, Ordering::SeqCst);

        let (event_tx, event_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let suppressed = Arc::clone(&self.suppressed);
        let running = Arc::clone(&self.running);

        let thread = thread::Builder::new()
            .name("keyboard-capture".to_string())
            .spawn(move || {
                info!("keyboard capture thread started");
                run_event_loop(event_tx, ready_tx, suppressed, running);
                info!("keyboard capture thread stopped");
            })
            .map_err(|e| TransportError::Io(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.events = Some(event_rx);
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(reason)) => {
                let _ = thread.join();
                Err(TransportError::Unavailable(reason))
            }
            Err(_) => {
                let _ = thread.join();
                Err(TransportError::Io("capture thread exited".to_string()))
            }
        }
    }

    fn poll(&mut self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, TransportError> {
        let events = self
            .events
            .as_ref()
            .ok_or_else(|| TransportError::Io("not connected".to_string()))?;
        let first = match events.recv_timeout(POLL_TIMEOUT) {
            Ok(event) => event,
            Err(mpsc::RecvTimeoutError::Timeout) => return Ok(Vec::new()),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(TransportError::Io("event tap stopped".to_string()))
            }
        };
        let mut batch = vec![first];
        batch.extend(events.try_iter());
        Ok(batch)
    }

    fn disconnect(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.events = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("keyboard capture thread panicked");
            }
        }
    }

    fn suppress(&mut self, keys: &[String]) {
        let layout = KeyLayout::new(Platform::MacOs);
        let codes: HashSet<u16> = keys
            .iter()
            .filter_map(|key| layout.machine_keycode(key))
            .collect();
        debug!(count = codes.len(), "suppressing keys");
        *self.suppressed.write() = codes;
    }
}

fn run_event_loop(
    event_tx: mpsc::Sender<RawEvent>,
    ready_tx: mpsc::SyncSender<Result<(), String>>,
    suppressed: Arc<RwLock<HashSet<u16>>>,
    running: Arc<AtomicBool>,
) {
    let layout = KeyLayout::new(Platform::MacOs);
    let reenable = Arc::new(AtomicBool::new(false));
    let tap_disabled = Arc::clone(&reenable);

    // Returning None swallows the event
    let callback = move |_proxy: CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        let pressed = match event_type {
            CGEventType::KeyDown => true,
            CGEventType::KeyUp => false,
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                tap_disabled.store(true, Ordering::SeqCst);
                return None;
            }
            _ => return Some(event.clone()),
        };
        if event.get_integer_value_field(EventField::EVENT_SOURCE_USER_DATA) == INJECTED_MARKER {
            return Some(event.clone());
        }
        // Shortcuts pass through untouched
        if !(event.get_flags() - capturable_flags()).is_empty() {
            return Some(event.clone());
        }

        let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
        let repeat = event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0;
        if let Some(key) = layout.machine_key(keycode) {
            if !repeat {
                let raw = if pressed {
                    RawEvent::KeyDown(key.to_string())
                } else {
                    RawEvent::KeyUp(key.to_string())
                };
                let _ = event_tx.send(raw);
            }
        }
        if suppressed.read().contains(&keycode) {
            None
        } else {
            Some(event.clone())
        }
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::Default,
        vec![CGEventType::KeyDown, CGEventType::KeyUp],
        callback,
    ) {
        Ok(tap) => tap,
        Err(()) => {
            error!("failed to create event tap - is Accessibility permission granted?");
            let _ = ready_tx.send(Err(
                "cannot create event tap; grant Accessibility permission".to_string()
            ));
            return;
        }
    };

    let run_loop_source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            let _ = ready_tx.send(Err("cannot create run loop source".to_string()));
            return;
        }
    };
    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }
    tap.enable();
    let _ = ready_tx.send(Ok(()));
    debug!("event tap created and enabled");

    while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, true);
        }
        if reenable.swap(false, Ordering::SeqCst) {
            warn!("event tap was disabled by the system, re-enabling");
            tap.enable();
        }
    }

    unsafe {
        run_loop.remove_source(&run_loop_source, kCFRunLoopCommonModes);
    }
}

/// Key output by posting Quartz keyboard events
pub struct QuartzOutput {
    source: CGEventSource,
    modifiers: CGEventFlags,
}

impl QuartzOutput {
    pub fn new() -> Result<Self, EmitError> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| EmitError::Unavailable("cannot create event source".to_string()))?;
        Ok(Self {
            source,
            modifiers: CGEventFlags::CGEventFlagNull,
        })
    }

    fn keyboard_event(&self, keycode: u16, pressed: bool) -> Result<CGEvent, EmitError> {
        let event = CGEvent::new_keyboard_event(self.source.clone(), keycode, pressed)
            .map_err(|_| EmitError::Backend(format!("cannot create event for key {keycode}")))?;
        event.set_integer_value_field(EventField::EVENT_SOURCE_USER_DATA, INJECTED_MARKER);
        Ok(event)
    }
}

/// Modifier keys carry their own flag
fn is_modifier_keycode(keycode: u16) -> bool {
    (0x36..=0x3E).contains(&keycode)
}

impl KeyOutput for QuartzOutput {
    fn key(&mut self, keycode: u16, pressed: bool) -> Result<(), EmitError> {
        let event = self.keyboard_event(keycode, pressed)?;
        if pressed && !is_modifier_keycode(keycode) {
            let flags = (event.get_flags() - modifier_flags()) | self.modifiers;
            event.set_flags(flags);
        }
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn set_modifiers(&mut self, modifiers: Modifiers) -> Result<(), EmitError> {
        let mut flags = CGEventFlags::CGEventFlagNull;
        if modifiers.shift {
            flags |= CGEventFlags::CGEventFlagShift;
        }
        if modifiers.control {
            flags |= CGEventFlags::CGEventFlagControl;
        }
        if modifiers.alt {
            flags |= CGEventFlags::CGEventFlagAlternate;
        }
        if modifiers.super_key {
            flags |= CGEventFlags::CGEventFlagCommand;
        }
        self.modifiers = flags;
        Ok(())
    }

    fn type_unicode(&mut self, text: &str) -> Result<(), EmitError> {
        // Quartz only takes a few UTF-16 units per event
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(10) {
            let chunk: String = chunk.iter().collect();
            for pressed in [true, false] {
                let event = self.keyboard_event(0, pressed)?;
                event.set_flags(CGEventFlags::CGEventFlagNull);
                event.set_string(&chunk);
                event.post(CGEventTapLocation::HID);
            }
        }
        Ok(())
    }
}
