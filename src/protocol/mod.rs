//! Stenograph wire protocol

mod packet;
mod session;

pub use packet::{
    extract_chords, PacketCodec, PacketError, StenoPacket, WriterError, HEADER_SIZE, ID_ERROR,
    ID_OPEN, ID_READ, READ_BYTES, REALTIME_DISK, REALTIME_FILE, STENOGRAPH_KEYS,
};
pub use session::{PacketLink, ProtocolError, StenographSession, RECEIVE_SLICE, RESPONSE_TIMEOUT};
