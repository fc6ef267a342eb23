//! Stenograph realtime session over an abstract packet link

use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::packet::{
    PacketCodec, StenoPacket, WriterError, HEADER_SIZE, ID_ERROR, ID_OPEN, ID_READ, READ_BYTES,
    REALTIME_DISK, REALTIME_FILE,
};

/// How long to wait for the writer to answer a request
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest single blocking receive, so cancellation is noticed quickly
pub const RECEIVE_SLICE: Duration = Duration::from_millis(50);

/// Receive buffer: header plus the largest payload the writer sends
const RECEIVE_BUFFER: usize = HEADER_SIZE + 1024;

/// Byte pipe to a Stenograph writer
pub trait PacketLink {
    /// Send one packet
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Receive one packet into `buf`, waiting at most `timeout`
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// Errors ending a session exchange
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("link failure: {0}")]
    Io(#[from] io::Error),

    #[error("no response from writer within {0:?}")]
    NoResponse(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// Open → realtime polling → error code handling
///
/// After the realtime file is opened, whatever the writer already holds is
/// skipped: reads advance the offset but chords are dropped until the
/// first empty READ response.
pub struct StenographSession<L> {
    link: L,
    codec: PacketCodec,
    response_timeout: Duration,
    file_offset: u32,
    opened: bool,
    realtime: bool,
}

impl<L: PacketLink> StenographSession<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            codec: PacketCodec::new(),
            response_timeout: RESPONSE_TIMEOUT,
            file_offset: 0,
            opened: false,
            realtime: false,
        }
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Whether chords are being forwarded
    pub fn is_realtime(&self) -> bool {
        self.realtime
    }

    pub fn file_offset(&self) -> u32 {
        self.file_offset
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Ask the writer to open its realtime file
    ///
    /// Returns `Ok(false)` if the writer refused; polling will retry.
    pub fn open_realtime(&mut self, cancel: &CancellationToken) -> Result<bool, ProtocolError> {
        let request = self.codec.make_open_request(REALTIME_FILE, REALTIME_DISK);
        let response = self.exchange(&request, cancel)?;
        match response.packet_id {
            ID_OPEN => {
                info!(file = REALTIME_FILE, "realtime file opened");
                self.opened = true;
                self.realtime = false;
                self.file_offset = 0;
                Ok(true)
            }
            ID_ERROR => {
                self.opened = false;
                debug!(code = response.p1, "writer refused open request");
                Ok(false)
            }
            other => {
                debug!(packet_id = other, "unexpected response to open request");
                Ok(false)
            }
        }
    }

    /// Run one read cycle and return the new chords
    pub fn poll(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<&'static str>>, ProtocolError> {
        if !self.opened && !self.open_realtime(cancel)? {
            return Ok(Vec::new());
        }

        let request = self.codec.make_read_request(self.file_offset, READ_BYTES);
        let response = self.exchange(&request, cancel)?;

        if let Some(code) = response.writer_error() {
            self.handle_writer_error(code);
            return Ok(Vec::new());
        }
        if response.packet_id != ID_READ {
            debug!(packet_id = response.packet_id, "unexpected response to read request");
            return Ok(Vec::new());
        }

        self.file_offset = self.file_offset.wrapping_add(response.data_length);
        if !self.realtime {
            if response.data.is_empty() {
                info!(offset = self.file_offset, "caught up with realtime file");
                self.realtime = true;
            } else {
                debug!(bytes = response.data_length, "skipping backlog");
            }
            return Ok(Vec::new());
        }
        Ok(response.chords())
    }

    fn handle_writer_error(&mut self, code: WriterError) {
        match code {
            WriterError::OperationUnavailable => debug!("writer busy, retrying on next poll"),
            WriterError::FileUnavailable => debug!("writer reports file unavailable"),
            WriterError::NoRealtimeFile => {
                debug!("no realtime file yet, reopening");
                self.opened = false;
                self.realtime = false;
            }
            WriterError::EndOfClosedFile => debug!("end of closed file"),
            WriterError::Unknown(code) => warn!(code, "unknown writer error code"),
        }
    }

    /// Send a request and wait for the response carrying its sequence number
    ///
    /// Short, malformed or stale responses are dropped.
    fn exchange(
        &mut self,
        request: &StenoPacket,
        cancel: &CancellationToken,
    ) -> Result<StenoPacket, ProtocolError> {
        self.link.send(&request.pack())?;

        let deadline = Instant::now() + self.response_timeout;
        let mut buf = vec![0u8; RECEIVE_BUFFER];
        loop {
            if cancel.is_cancelled() {
                return Err(ProtocolError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ProtocolError::NoResponse(self.response_timeout));
            }
            let n = self
                .link
                .receive(&mut buf, RECEIVE_SLICE.min(deadline - now))?;
            if n == 0 {
                continue;
            }
            match StenoPacket::unpack(&buf[..n]) {
                Ok(response) if response.sequence_number == request.sequence_number => {
                    return Ok(response)
                }
                Ok(response) => debug!(
                    expected = request.sequence_number,
                    got = response.sequence_number,
                    "discarding stale response"
                ),
                Err(e) => debug!(%e, "discarding malformed response"),
            }
        }
    }
}
