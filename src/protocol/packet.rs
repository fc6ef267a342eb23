//! Stenograph USB packet layout
//!
//! Every packet is a 32-byte little-endian header followed by
//! `data_length` bytes of payload:
//!
//! | offset | size | field             |
//! |--------|------|-------------------|
//! | 0      | 2    | sync, always "SG" |
//! | 2      | 4    | sequence number   |
//! | 6      | 2    | packet id         |
//! | 8      | 4    | data length       |
//! | 12     | 20   | p1..p5            |

use thiserror::Error;

/// Size of the fixed packet header
pub const HEADER_SIZE: usize = 32;

/// Sync bytes opening every packet
pub const SYNC: [u8; 2] = *b"SG";

/// Error report from the writer, `p1` holds the error code
pub const ID_ERROR: u16 = 0x06;
/// Open a file on the writer
pub const ID_OPEN: u16 = 0x12;
/// Read bytes from the open file
pub const ID_READ: u16 = 0x13;

/// Bytes requested per read
pub const READ_BYTES: u32 = 512;

/// Live stroke log on the writer
pub const REALTIME_FILE: &str = "REALTIME.000";
/// Disk holding the realtime file
pub const REALTIME_DISK: u8 = b'A';

/// Key symbols per chord byte, most significant used bit first
const STENO_KEY_CHART: [[&str; 6]; 4] = [
    ["^", "#", "S-", "T-", "K-", "P-"],
    ["W-", "H-", "R-", "A-", "O-", "*"],
    ["-E", "-U", "-F", "-R", "-P", "-B"],
    ["-L", "-G", "-T", "-S", "-D", "-Z"],
];

/// Every raw key the writer can report, in chart order
pub const STENOGRAPH_KEYS: [&str; 24] = [
    "^", "#", "S-", "T-", "K-", "P-", "W-", "H-", "R-", "A-", "O-", "*", "-E", "-U", "-F", "-R",
    "-P", "-B", "-L", "-G", "-T", "-S", "-D", "-Z",
];

const SEQUENCE_MODULUS: u32 = 0xFFFF_FFFF;

/// Bytes per chord in a READ payload: 4 key bytes, 4 timestamp bytes
const CHORD_SIZE: usize = 8;
/// Both high bits set mark a byte carrying key bits
const KEY_BYTE_MARKER: u8 = 0b1100_0000;

/// Errors decoding a packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet shorter than header: {0} bytes")]
    Short(usize),

    #[error("bad sync bytes {0:02x?}")]
    BadSync([u8; 2]),

    #[error("payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Error codes reported in ERROR packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterError {
    /// The writer cannot perform the request right now
    OperationUnavailable,
    /// The requested file is not available
    FileUnavailable,
    /// No realtime file has been started yet
    NoRealtimeFile,
    /// Read past the end of a file that is closed
    EndOfClosedFile,
    Unknown(u32),
}

impl From<u32> for WriterError {
    fn from(code: u32) -> Self {
        match code {
            3 => Self::OperationUnavailable,
            7 => Self::FileUnavailable,
            8 => Self::NoRealtimeFile,
            9 => Self::EndOfClosedFile,
            other => Self::Unknown(other),
        }
    }
}

/// One request or response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StenoPacket {
    pub sequence_number: u32,
    pub packet_id: u16,
    pub data_length: u32,
    pub p1: u32,
    pub p2: u32,
    pub p3: u32,
    pub p4: u32,
    pub p5: u32,
    pub data: Vec<u8>,
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl StenoPacket {
    /// Serialize header and payload
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.data.len());
        out.extend_from_slice(&SYNC);
        out.extend_from_slice(&self.sequence_number.to_le_bytes());
        out.extend_from_slice(&self.packet_id.to_le_bytes());
        out.extend_from_slice(&self.data_length.to_le_bytes());
        for p in [self.p1, self.p2, self.p3, self.p4, self.p5] {
            out.extend_from_slice(&p.to_le_bytes());
        }
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse a packet; bytes past `data_length` are ignored
    pub fn unpack(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PacketError::Short(bytes.len()));
        }
        let sync = [bytes[0], bytes[1]];
        if sync != SYNC {
            return Err(PacketError::BadSync(sync));
        }
        let data_length = read_u32(bytes, 8);
        let payload = &bytes[HEADER_SIZE..];
        let expected = data_length as usize;
        if payload.len() < expected {
            return Err(PacketError::Truncated {
                expected,
                actual: payload.len(),
            });
        }
        Ok(Self {
            sequence_number: read_u32(bytes, 2),
            packet_id: read_u16(bytes, 6),
            data_length,
            p1: read_u32(bytes, 12),
            p2: read_u32(bytes, 16),
            p3: read_u32(bytes, 20),
            p4: read_u32(bytes, 24),
            p5: read_u32(bytes, 28),
            data: payload[..expected].to_vec(),
        })
    }

    /// Error code carried by an ERROR packet
    pub fn writer_error(&self) -> Option<WriterError> {
        (self.packet_id == ID_ERROR).then(|| WriterError::from(self.p1))
    }

    /// Chords in a READ payload
    pub fn chords(&self) -> Vec<Vec<&'static str>> {
        extract_chords(&self.data)
    }
}

/// Decode the chords of a READ payload
///
/// Each chord is 8 bytes: 4 key bytes and a 4-byte timestamp, which is
/// ignored. Key bytes without the `11xxxxxx` marker carry no data. Chords
/// with no key set, and a trailing partial chord, are dropped.
pub fn extract_chords(payload: &[u8]) -> Vec<Vec<&'static str>> {
    let mut chords = Vec::new();
    for chunk in payload.chunks_exact(CHORD_SIZE) {
        let mut keys = Vec::new();
        for (byte, symbols) in chunk[..4].iter().zip(STENO_KEY_CHART.iter()) {
            if byte & KEY_BYTE_MARKER != KEY_BYTE_MARKER {
                continue;
            }
            for (i, symbol) in symbols.iter().enumerate() {
                if byte >> (5 - i) & 1 == 1 {
                    keys.push(*symbol);
                }
            }
        }
        if !keys.is_empty() {
            chords.push(keys);
        }
    }
    chords
}

/// Builds requests, numbering each one
///
/// Sequence numbers count modulo `0xFFFFFFFF`: `0xFFFFFFFE` is followed
/// by `0`.
#[derive(Debug, Clone, Default)]
pub struct PacketCodec {
    next_sequence: u32,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec whose next request uses `sequence_number`
    pub fn starting_at(sequence_number: u32) -> Self {
        Self {
            next_sequence: sequence_number % SEQUENCE_MODULUS,
        }
    }

    fn take_sequence_number(&mut self) -> u32 {
        let n = self.next_sequence;
        self.next_sequence = (n + 1) % SEQUENCE_MODULUS;
        n
    }

    /// Request to open `filename` on disk `disk_id`
    pub fn make_open_request(&mut self, filename: &str, disk_id: u8) -> StenoPacket {
        let data = filename.as_bytes().to_vec();
        StenoPacket {
            sequence_number: self.take_sequence_number(),
            packet_id: ID_OPEN,
            data_length: data.len() as u32,
            p1: u32::from(disk_id),
            data,
            ..Default::default()
        }
    }

    /// Request `byte_count` bytes of the open file starting at `file_offset`
    pub fn make_read_request(&mut self, file_offset: u32, byte_count: u32) -> StenoPacket {
        StenoPacket {
            sequence_number: self.take_sequence_number(),
            packet_id: ID_READ,
            p1: file_offset,
            p2: byte_count,
            ..Default::default()
        }
    }
}
