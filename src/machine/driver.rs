//! Machine driver: capture worker and state machine
//!
//! ```text
//! Stopped ──start──▶ Initializing ──handshake ok──▶ Connected
//!                         │                          │  ▲
//!                    handshake failed           I/O failure │
//!                         ▼                          ▼  │ reconnected
//!                       Error                  Disconnected ──▶ Initializing
//! ```
//!
//! `stop_capture` returns every state to `Stopped`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::stroke::StrokeAssembler;
use super::supervisor::{self, Reconnect, RECONNECT_INTERVAL};
use super::transport::{RawEvent, Transport, TransportError};
use crate::events::{EventSender, MachineEvent, MachineState, Stroke};
use crate::keymap::Keymap;

/// Builds a fresh transport for each capture session
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

/// Errors from driver control
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("capture is already running")]
    AlreadyRunning,

    #[error("unknown machine type \"{0}\"")]
    UnknownMachine(String),

    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(String),
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Complete strokes on release of the arpeggiate key
    pub arpeggiate: bool,
    pub reconnect_interval: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            arpeggiate: false,
            reconnect_interval: RECONNECT_INTERVAL,
        }
    }
}

/// State shared between the driver and its worker
struct Shared {
    machine_type: String,
    state: Mutex<MachineState>,
    keymap: RwLock<Arc<Keymap>>,
    keymap_generation: AtomicU64,
    events: EventSender,
}

impl Shared {
    fn state(&self) -> MachineState {
        *self.state.lock()
    }

    fn set_state(&self, state: MachineState) {
        {
            let mut current = self.state.lock();
            if *current == state {
                return;
            }
            *current = state;
        }
        info!(machine = %self.machine_type, %state, "machine state changed");
        let _ = self.events.send(MachineEvent::StateChanged {
            machine_type: self.machine_type.clone(),
            state,
        });
    }

    fn emit_stroke(&self, raw_keys: &[String], keymap: &Keymap) {
        match Stroke::new(keymap.keys_to_actions(raw_keys)) {
            Ok(stroke) => {
                debug!(?raw_keys, %stroke, "stroke");
                let _ = self.events.send(MachineEvent::Stroke { keys: stroke });
            }
            Err(_) => debug!(?raw_keys, "chord maps to no steno keys"),
        }
    }
}

/// Releases the hardware handle when dropped
struct Connection<'a> {
    transport: &'a mut dyn Transport,
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        self.transport.disconnect();
        debug!("hardware handle released");
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives one machine type
pub struct MachineDriver {
    shared: Arc<Shared>,
    factory: TransportFactory,
    options: DriverOptions,
    worker: Option<Worker>,
}

impl MachineDriver {
    pub fn new(
        machine_type: impl Into<String>,
        factory: TransportFactory,
        keymap: Keymap,
        options: DriverOptions,
        events: EventSender,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                machine_type: machine_type.into(),
                state: Mutex::new(MachineState::Stopped),
                keymap: RwLock::new(Arc::new(keymap)),
                keymap_generation: AtomicU64::new(0),
                events,
            }),
            factory,
            options,
            worker: None,
        }
    }

    pub fn machine_type(&self) -> &str {
        &self.shared.machine_type
    }

    pub fn state(&self) -> MachineState {
        self.shared.state()
    }

    pub fn keymap(&self) -> Arc<Keymap> {
        Arc::clone(&self.shared.keymap.read())
    }

    /// Replace the keymap; a running worker picks it up before its next read
    pub fn set_keymap(&self, keymap: Keymap) {
        *self.shared.keymap.write() = Arc::new(keymap);
        self.shared.keymap_generation.fetch_add(1, Ordering::AcqRel);
        debug!(machine = %self.shared.machine_type, "keymap updated");
    }

    /// Start the capture worker
    ///
    /// Allowed from `Stopped` and `Error`.
    pub fn start_capture(&mut self) -> Result<(), DriverError> {
        if self.state().is_running() {
            return Err(DriverError::AlreadyRunning);
        }
        // A worker that ended in Error has already returned
        if let Some(old) = self.worker.take() {
            let _ = old.handle.join();
        }

        self.shared.set_state(MachineState::Initializing);
        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let transport = (self.factory)();
        let options = self.options.clone();
        let worker_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name(format!("machine-{}", shared.machine_type.to_lowercase()))
            .spawn(move || {
                debug!(machine = %shared.machine_type, "capture thread started");
                run_worker(&shared, transport, &options, &worker_cancel);
                debug!(machine = %shared.machine_type, "capture thread stopped");
            })
            .map_err(|e| {
                self.shared.set_state(MachineState::Error);
                DriverError::ThreadSpawn(e.to_string())
            })?;

        self.worker = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Stop capture from any state and wait for the worker to exit
    pub fn stop_capture(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
            if worker.handle.join().is_err() {
                error!(machine = %self.shared.machine_type, "capture thread panicked");
            }
        }
        self.shared.set_state(MachineState::Stopped);
    }
}

impl Drop for MachineDriver {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop_capture();
        }
    }
}

fn run_worker(
    shared: &Shared,
    mut transport: Box<dyn Transport>,
    options: &DriverOptions,
    cancel: &CancellationToken,
) {
    if let Err(e) = transport.connect(cancel) {
        if !cancel.is_cancelled() {
            error!(machine = %shared.machine_type, %e, "machine handshake failed");
            shared.set_state(MachineState::Error);
        }
        return;
    }

    loop {
        let result = {
            let mut connection = Connection {
                transport: transport.as_mut(),
            };
            shared.set_state(MachineState::Connected);
            capture(shared, &mut connection, options, cancel)
        };
        let e = match result {
            Ok(()) => return,
            Err(_) if cancel.is_cancelled() => return,
            Err(e) if !e.is_transient() => {
                error!(machine = %shared.machine_type, %e, "machine became unavailable");
                shared.set_state(MachineState::Error);
                return;
            }
            Err(e) => e,
        };

        warn!(machine = %shared.machine_type, %e, "machine disconnected, reconnecting");
        shared.set_state(MachineState::Disconnected);
        shared.set_state(MachineState::Initializing);
        match supervisor::reconnect(transport.as_mut(), options.reconnect_interval, cancel) {
            Reconnect::Connected { attempts } => {
                info!(machine = %shared.machine_type, attempts, "machine reconnected")
            }
            Reconnect::Cancelled => return,
            Reconnect::Unavailable(e) => {
                error!(machine = %shared.machine_type, %e, "machine unavailable, giving up");
                shared.set_state(MachineState::Error);
                return;
            }
        }
    }
}

/// Read until cancelled (`Ok`) or the transport fails
fn capture(
    shared: &Shared,
    connection: &mut Connection<'_>,
    options: &DriverOptions,
    cancel: &CancellationToken,
) -> Result<(), TransportError> {
    let mut assembler = StrokeAssembler::new(options.arpeggiate);
    let mut keymap = Arc::new(Keymap::default());
    let mut generation = None;

    while !cancel.is_cancelled() {
        let current = shared.keymap_generation.load(Ordering::Acquire);
        if generation != Some(current) {
            keymap = Arc::clone(&shared.keymap.read());
            assembler.set_keymap(&keymap);
            connection.transport.suppress(&assembler.captured_keys());
            generation = Some(current);
        }

        let events = connection.transport.poll(cancel)?;
        if events.is_empty() {
            continue;
        }
        if shared.state() != MachineState::Connected {
            debug!(count = events.len(), "discarding input while not connected");
            continue;
        }
        for event in events {
            match event {
                RawEvent::KeyDown(key) => assembler.key_down(&key),
                RawEvent::KeyUp(key) => {
                    if let Some(raw_keys) = assembler.key_up(&key) {
                        shared.emit_stroke(&raw_keys, &keymap);
                    }
                }
                RawEvent::Chord(raw_keys) => shared.emit_stroke(&raw_keys, &keymap),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use super::*;
    use crate::events::{self, EventReceiver};

    enum Step {
        Events(Vec<RawEvent>),
        Fail(TransportError),
    }

    /// Scripted hardware shared by every transport the factory builds
    #[derive(Default)]
    struct MockMachine {
        connects: AtomicUsize,
        releases: AtomicUsize,
        hang_on_connect: bool,
        connect_results: Mutex<VecDeque<Result<(), TransportError>>>,
        steps: Mutex<VecDeque<Step>>,
        suppressed: Mutex<Vec<String>>,
    }

    struct MockTransport(Arc<MockMachine>);

    impl Transport for MockTransport {
        fn connect(&mut self, cancel: &CancellationToken) -> Result<(), TransportError> {
            if self.0.hang_on_connect {
                while !cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                return Err(TransportError::Io("cancelled".into()));
            }
            let result = self.0.connect_results.lock().pop_front().unwrap_or(Ok(()));
            if result.is_ok() {
                self.0.connects.fetch_add(1, Ordering::SeqCst);
            }
            result
        }

        fn poll(&mut self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, TransportError> {
            match self.0.steps.lock().pop_front() {
                Some(Step::Events(events)) => Ok(events),
                Some(Step::Fail(e)) => Err(e),
                None => {
                    thread::sleep(Duration::from_millis(5));
                    Ok(Vec::new())
                }
            }
        }

        fn disconnect(&mut self) {
            self.0.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn suppress(&mut self, keys: &[String]) {
            *self.0.suppressed.lock() = keys.to_vec();
        }
    }

    fn keymap() -> Keymap {
        let mut keymap = Keymap::new(["a", "w", "z"], ["S-", "T-"]);
        keymap.bind("a", "S-").unwrap();
        keymap.bind("w", "T-").unwrap();
        keymap.bind("z", "no-op").unwrap();
        keymap
    }

    fn driver(machine: &Arc<MockMachine>, interval: Duration) -> (MachineDriver, EventReceiver) {
        let (tx, rx) = events::channel();
        let shared = Arc::clone(machine);
        let factory: TransportFactory =
            Arc::new(move || Box::new(MockTransport(Arc::clone(&shared))));
        let options = DriverOptions {
            arpeggiate: false,
            reconnect_interval: interval,
        };
        (MachineDriver::new("Mock", factory, keymap(), options, tx), rx)
    }

    fn wait_until(f: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn drain(rx: &mut EventReceiver) -> Vec<MachineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn states(events: &[MachineEvent]) -> Vec<MachineState> {
        events
            .iter()
            .filter_map(|e| match e {
                MachineEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn strokes(events: &[MachineEvent]) -> Vec<Vec<String>> {
        events
            .iter()
            .filter_map(|e| match e {
                MachineEvent::Stroke { keys } => Some(keys.keys().to_vec()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_stop_when_connected_releases_handle_once() {
        let machine = Arc::new(MockMachine::default());
        let (mut driver, mut rx) = driver(&machine, RECONNECT_INTERVAL);
        driver.start_capture().unwrap();
        assert!(wait_until(|| driver.state() == MachineState::Connected));

        let started = Instant::now();
        driver.stop_capture();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(driver.state(), MachineState::Stopped);
        assert_eq!(machine.connects.load(Ordering::SeqCst), 1);
        assert_eq!(machine.releases.load(Ordering::SeqCst), 1);
        assert_eq!(
            states(&drain(&mut rx)),
            vec![
                MachineState::Initializing,
                MachineState::Connected,
                MachineState::Stopped
            ]
        );
    }

    #[test]
    fn test_stop_while_initializing() {
        let machine = Arc::new(MockMachine {
            hang_on_connect: true,
            ..Default::default()
        });
        let (mut driver, _rx) = driver(&machine, RECONNECT_INTERVAL);
        driver.start_capture().unwrap();
        assert_eq!(driver.state(), MachineState::Initializing);

        let started = Instant::now();
        driver.stop_capture();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(driver.state(), MachineState::Stopped);
        assert_eq!(machine.releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_during_reconnect() {
        let machine = Arc::new(MockMachine::default());
        machine
            .steps
            .lock()
            .push_back(Step::Fail(TransportError::Io("unplugged".into())));
        let (mut driver, mut rx) = driver(&machine, Duration::from_secs(30));
        driver.start_capture().unwrap();
        assert!(wait_until(|| machine.releases.load(Ordering::SeqCst) == 1
            && driver.state() == MachineState::Initializing));

        let started = Instant::now();
        driver.stop_capture();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(driver.state(), MachineState::Stopped);
        assert_eq!(machine.connects.load(Ordering::SeqCst), 1);
        assert_eq!(machine.releases.load(Ordering::SeqCst), 1);
        assert_eq!(
            states(&drain(&mut rx)),
            vec![
                MachineState::Initializing,
                MachineState::Connected,
                MachineState::Disconnected,
                MachineState::Initializing,
                MachineState::Stopped
            ]
        );
    }

    #[test]
    fn test_reconnects_after_io_failure() {
        let machine = Arc::new(MockMachine::default());
        machine
            .steps
            .lock()
            .push_back(Step::Fail(TransportError::Io("unplugged".into())));
        machine
            .connect_results
            .lock()
            .extend([Ok(()), Err(TransportError::NotFound)]);
        let (mut driver, _rx) = driver(&machine, Duration::from_millis(10));
        driver.start_capture().unwrap();
        assert!(wait_until(|| machine.connects.load(Ordering::SeqCst) == 2
            && driver.state() == MachineState::Connected));

        driver.stop_capture();
        assert_eq!(machine.releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unavailable_during_reconnect_is_error() {
        let machine = Arc::new(MockMachine::default());
        machine
            .steps
            .lock()
            .push_back(Step::Fail(TransportError::Io("unplugged".into())));
        machine
            .connect_results
            .lock()
            .extend([Ok(()), Err(TransportError::Unavailable("denied".into()))]);
        let (mut driver, _rx) = driver(&machine, Duration::from_millis(10));
        driver.start_capture().unwrap();
        assert!(wait_until(|| driver.state() == MachineState::Error));
        driver.stop_capture();
        assert_eq!(driver.state(), MachineState::Stopped);
    }

    #[test]
    fn test_failed_handshake_needs_restart() {
        let machine = Arc::new(MockMachine::default());
        machine
            .connect_results
            .lock()
            .push_back(Err(TransportError::NotFound));
        let (mut driver, _rx) = driver(&machine, Duration::from_millis(10));
        driver.start_capture().unwrap();
        assert!(wait_until(|| driver.state() == MachineState::Error));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(driver.state(), MachineState::Error);

        driver.start_capture().unwrap();
        assert!(wait_until(|| driver.state() == MachineState::Connected));
        driver.stop_capture();
    }

    #[test]
    fn test_start_twice_is_refused() {
        let machine = Arc::new(MockMachine::default());
        let (mut driver, _rx) = driver(&machine, RECONNECT_INTERVAL);
        driver.start_capture().unwrap();
        assert!(matches!(driver.start_capture(), Err(DriverError::AlreadyRunning)));
        driver.stop_capture();
        // Stopping twice is harmless
        driver.stop_capture();
        assert_eq!(machine.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_strokes_only_on_full_release() {
        let machine = Arc::new(MockMachine::default());
        machine.steps.lock().extend([
            Step::Events(vec![
                RawEvent::KeyDown("w".into()),
                RawEvent::KeyDown("a".into()),
                RawEvent::KeyUp("w".into()),
            ]),
            Step::Events(vec![RawEvent::KeyUp("a".into())]),
            Step::Events(vec![
                RawEvent::KeyDown("z".into()),
                RawEvent::KeyUp("z".into()),
            ]),
            Step::Events(vec![RawEvent::chord(["w", "z"])]),
        ]);
        let (mut driver, mut rx) = driver(&machine, RECONNECT_INTERVAL);
        driver.start_capture().unwrap();
        assert!(wait_until(|| machine.steps.lock().is_empty()));
        thread::sleep(Duration::from_millis(20));
        driver.stop_capture();

        assert_eq!(
            strokes(&drain(&mut rx)),
            vec![vec!["S-".to_string(), "T-".to_string()], vec!["T-".to_string()]]
        );
    }

    #[test]
    fn test_keymap_change_reaches_worker() {
        let machine = Arc::new(MockMachine::default());
        let (mut driver, _rx) = driver(&machine, RECONNECT_INTERVAL);
        driver.start_capture().unwrap();
        assert!(wait_until(|| machine.suppressed.lock().len() == 3));

        let mut smaller = Keymap::new(["a", "w", "z"], ["S-", "T-"]);
        smaller.bind("a", "T-").unwrap();
        driver.set_keymap(smaller);
        assert!(wait_until(|| *machine.suppressed.lock() == vec!["a".to_string()]));
        assert_eq!(driver.keymap().binding("a"), Some("T-"));
        driver.stop_capture();
    }
}
