//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! machine events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::MachineEvent;
use crate::machine::MachineDriver;
use crate::output::{OutputCommand, OutputHandle};

use super::protocol::{
    encode_frame, DaemonStatus, Notification, Request, Response, MAX_BACKSPACES, MAX_MESSAGE_LEN,
};

/// What request handlers act on
pub struct Daemon {
    driver: Arc<Mutex<MachineDriver>>,
    output: OutputHandle,
    system: String,
    start_time: Instant,
}

impl Daemon {
    pub fn new(driver: Arc<Mutex<MachineDriver>>, output: OutputHandle, system: String) -> Self {
        Self {
            driver,
            output,
            system,
            start_time: Instant::now(),
        }
    }

    pub fn status(&self) -> DaemonStatus {
        let driver = self.driver.lock();
        DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            machine_type: driver.machine_type().to_string(),
            system: self.system.clone(),
            state: driver.state(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Run a blocking driver call off the async runtime
    async fn with_driver<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut MachineDriver) -> T + Send + 'static,
    {
        let driver = Arc::clone(&self.driver);
        tokio::task::spawn_blocking(move || f(&mut driver.lock()))
            .await
            .context("driver task failed")
    }

    async fn output(&self, command: OutputCommand) -> Response {
        match self.output.send(command).await {
            Ok(()) => Response::Ok,
            Err(e) => {
                warn!(%e, "key output failed");
                e.into()
            }
        }
    }

    /// Process a request; the flag asks for a subscription
    async fn process_request(&self, request: Request) -> (Response, bool) {
        let response = match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(self.status()),

            Request::Subscribe => return (Response::Subscribed, true),

            Request::StartCapture => match self.with_driver(|d| d.start_capture()).await {
                Ok(Ok(())) => Response::Ok,
                Ok(Err(e)) => e.into(),
                Err(e) => Response::error("internal", format!("{e:#}")),
            },

            Request::StopCapture => match self.with_driver(|d| d.stop_capture()).await {
                Ok(()) => Response::Ok,
                Err(e) => Response::error("internal", format!("{e:#}")),
            },

            Request::SendKeyCombination { combo } => {
                self.output(OutputCommand::KeyCombination(combo)).await
            }

            Request::SendString { text } => self.output(OutputCommand::String(text)).await,

            Request::SendBackspaces { count } if count > MAX_BACKSPACES => Response::error(
                "invalid_request",
                format!("at most {} backspaces per request", MAX_BACKSPACES),
            ),

            Request::SendBackspaces { count } => {
                self.output(OutputCommand::Backspaces(count)).await
            }
        };
        (response, false)
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    daemon: Arc<Daemon>,
    shutdown_tx: broadcast::Sender<()>,
    events: broadcast::Sender<MachineEvent>,
}

impl Server {
    /// Create a new IPC server
    ///
    /// Subscribed clients receive everything published on `events`.
    pub fn new(
        socket_path: &Path,
        daemon: Arc<Daemon>,
        events: broadcast::Sender<MachineEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            daemon,
            shutdown_tx,
            events,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let daemon = Arc::clone(&self.daemon);
                    let events = self.events.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, daemon, events) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        daemon: Arc<Daemon>,
        events: broadcast::Sender<MachineEvent>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Responses and notifications share one writer
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = writer.write_all(&frame).await {
                    debug!(?e, "client write failed");
                    break;
                }
            }
        });

        let mut forwarder = None;
        let result: Result<()> = async {
            while let Some(body) = read_message(&mut reader).await? {
                let (response, subscribe) = match serde_json::from_slice::<Request>(&body) {
                    Ok(request) => {
                        debug!(?request, "received request");
                        daemon.process_request(request).await
                    }
                    Err(e) => (Response::error("invalid_request", e), false),
                };
                if subscribe && forwarder.is_none() {
                    debug!("client subscribed to notifications");
                    forwarder = Some(tokio::spawn(forward_events(
                        events.subscribe(),
                        out_tx.clone(),
                    )));
                }
                if out_tx.send(encode_frame(&response)?).is_err() {
                    break;
                }
            }
            debug!("client disconnected");
            Ok(())
        }
        .await;

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        drop(out_tx);
        let _ = writer_task.await;
        result
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Read one length-prefixed message; `None` when the client hung up
async fn read_message(reader: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Push machine events to one subscribed client
async fn forward_events(
    mut events: broadcast::Receiver<MachineEvent>,
    out_tx: mpsc::UnboundedSender<Vec<u8>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let frame = match encode_frame(&Notification::MachineEvent { event }) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!(?e, "failed to encode notification");
                        continue;
                    }
                };
                if out_tx.send(frame).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
