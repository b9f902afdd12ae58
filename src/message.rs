use std::fmt;

use bytes::{Buf, BufMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::client::PeerError;

/// Largest frame accepted from a peer, in bytes following the length prefix
pub const MAX_MESSAGE_LEN: u32 = 1 << 20;

const BITS_IN_BYTE: usize = 8;
const REQUEST_PAYLOAD_LEN: usize = 12;
const PIECE_HEADER_LEN: usize = 8;

/// Wrapper type for bitfield message payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    data: Vec<u8>,
}

impl Bitfield {
    /// Create instance from bitfield message payload
    pub fn new(data: Vec<u8>) -> Bitfield {
        Bitfield { data }
    }

    /// Empty bitfield with room for the given number of pieces
    pub fn with_pieces(no_of_pieces: usize) -> Bitfield {
        Bitfield {
            data: vec![0; no_of_pieces.div_ceil(BITS_IN_BYTE)],
        }
    }

    /// Check if the bitfield contains the piece with the given index
    pub fn has_piece(&self, idx: usize) -> bool {
        let offset = idx % BITS_IN_BYTE;
        self.data
            .get(idx / BITS_IN_BYTE)
            .is_some_and(|byte| byte >> (BITS_IN_BYTE - 1 - offset) & 0b00000001 == 0b00000001)
    }

    /// Set the bit in the bitfield that corresponds to the given piece index
    ///
    /// Indices past the end of the bitfield are ignored.
    pub fn set_piece(&mut self, idx: usize) {
        let offset = idx % BITS_IN_BYTE;
        if let Some(byte) = self.data.get_mut(idx / BITS_IN_BYTE) {
            *byte |= 0b00000001 << (BITS_IN_BYTE - 1 - offset);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Peer message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    /// Index of piece the sender has completed and checked the hash of
    Have = 4,
    /// Which pieces (by index) the sender has
    Bitfield = 5,
    /// Request a subset of a piece (a block)
    Request = 6,
    /// A subset of a piece (a block)
    Piece = 7,
    /// Cancel a request for a block
    Cancel = 8,
    /// Listen port of the sender's DHT node
    Port = 9,
}

impl TryFrom<u8> for MessageId {
    type Error = PeerError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        let message_id = match id {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            9 => MessageId::Port,
            _ => return Err(PeerError::UnknownMessageId(id)),
        };
        Ok(message_id)
    }
}

/// Block of a piece, as named by request and cancel messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub index: u32,
    pub begin: u32,
    pub length: u32,
}

/// Message with a type and raw payload, interpreted through the `parse_*` methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(id: MessageId, payload: Vec<u8>) -> Message {
        Message { id, payload }
    }

    pub fn choke() -> Message {
        Message::new(MessageId::Choke, vec![])
    }

    pub fn unchoke() -> Message {
        Message::new(MessageId::Unchoke, vec![])
    }

    pub fn interested() -> Message {
        Message::new(MessageId::Interested, vec![])
    }

    pub fn not_interested() -> Message {
        Message::new(MessageId::NotInterested, vec![])
    }

    pub fn have(index: u32) -> Message {
        Message::new(MessageId::Have, index.to_be_bytes().to_vec())
    }

    pub fn bitfield(bitfield: &Bitfield) -> Message {
        Message::new(MessageId::Bitfield, bitfield.as_bytes().to_vec())
    }

    pub fn request(index: u32, begin: u32, length: u32) -> Message {
        Message::new(MessageId::Request, block_request_payload(index, begin, length))
    }

    pub fn cancel(index: u32, begin: u32, length: u32) -> Message {
        Message::new(MessageId::Cancel, block_request_payload(index, begin, length))
    }

    pub fn piece(index: u32, begin: u32, block: &[u8]) -> Message {
        let mut payload = Vec::with_capacity(PIECE_HEADER_LEN + block.len());
        payload.put_u32(index);
        payload.put_u32(begin);
        payload.put_slice(block);
        Message::new(MessageId::Piece, payload)
    }

    pub fn port(port: u16) -> Message {
        Message::new(MessageId::Port, port.to_be_bytes().to_vec())
    }

    /// Value of the length prefix: the type byte plus the payload
    pub fn length(&self) -> u32 {
        1 + self.payload.len() as u32
    }

    /// Serialise [`Message`] to raw bytes
    pub fn serialise(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 1 + self.payload.len());
        buf.put_u32(self.length());
        buf.put_u8(self.id as u8);
        buf.put_slice(&self.payload);
        buf
    }

    fn expect(&self, id: MessageId) -> Result<(), PeerError> {
        if self.id != id {
            return Err(PeerError::UnexpectedMessage {
                expected: id,
                actual: self.id,
            });
        }
        Ok(())
    }

    /// Piece index announced by a have message
    pub fn parse_have(&self) -> Result<u32, PeerError> {
        self.expect(MessageId::Have)?;
        if self.payload.len() != 4 {
            return Err(PeerError::InvalidHavePayload(self.payload.len()));
        }
        let mut payload = &self.payload[..];
        Ok(payload.get_u32())
    }

    pub fn parse_bitfield(&self) -> Result<Bitfield, PeerError> {
        self.expect(MessageId::Bitfield)?;
        Ok(Bitfield::new(self.payload.clone()))
    }

    pub fn parse_request(&self) -> Result<BlockRequest, PeerError> {
        self.expect(MessageId::Request)?;
        self.block_request()
    }

    pub fn parse_cancel(&self) -> Result<BlockRequest, PeerError> {
        self.expect(MessageId::Cancel)?;
        self.block_request()
    }

    /// Offset and data of the block carried by a piece message
    ///
    /// Fails unless the message belongs to the piece with index `expected_index`.
    pub fn parse_piece(&self, expected_index: u32) -> Result<(u32, &[u8]), PeerError> {
        self.expect(MessageId::Piece)?;
        if self.payload.len() < PIECE_HEADER_LEN {
            return Err(PeerError::InvalidPiecePayload(self.payload.len()));
        }
        let mut payload = &self.payload[..];
        let index = payload.get_u32();
        if index != expected_index {
            return Err(PeerError::UnexpectedPieceIndex {
                expected: expected_index,
                actual: index,
            });
        }
        let begin = payload.get_u32();
        Ok((begin, payload))
    }

    pub fn parse_port(&self) -> Result<u16, PeerError> {
        self.expect(MessageId::Port)?;
        if self.payload.len() != 2 {
            return Err(PeerError::InvalidPortPayload(self.payload.len()));
        }
        let mut payload = &self.payload[..];
        Ok(payload.get_u16())
    }

    fn block_request(&self) -> Result<BlockRequest, PeerError> {
        if self.payload.len() != REQUEST_PAYLOAD_LEN {
            return Err(PeerError::InvalidRequestPayload(self.payload.len()));
        }
        let mut payload = &self.payload[..];
        Ok(BlockRequest {
            index: payload.get_u32(),
            begin: payload.get_u32(),
            length: payload.get_u32(),
        })
    }
}

fn block_request_payload(index: u32, begin: u32, length: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(REQUEST_PAYLOAD_LEN);
    payload.put_u32(index);
    payload.put_u32(begin);
    payload.put_u32(length);
    payload
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            MessageId::Have => {
                if let Ok(index) = self.parse_have() {
                    return write!(f, "Have[{}]", index);
                }
            }
            MessageId::Bitfield => return write!(f, "Bitfield[{} bytes]", self.payload.len()),
            MessageId::Request | MessageId::Cancel => {
                if let Ok(req) = self.block_request() {
                    return write!(
                        f,
                        "{:?}[{}:{}:{}]",
                        self.id, req.index, req.begin, req.length
                    );
                }
            }
            MessageId::Piece => {
                if self.payload.len() >= PIECE_HEADER_LEN {
                    let mut payload = &self.payload[..];
                    let index = payload.get_u32();
                    let begin = payload.get_u32();
                    return write!(f, "Piece[{}:{}:{} bytes]", index, begin, payload.len());
                }
            }
            MessageId::Port => {
                if let Ok(port) = self.parse_port() {
                    return write!(f, "Port[{}]", port);
                }
            }
            _ => {}
        }
        if self.payload.is_empty() {
            write!(f, "{:?}", self.id)
        } else {
            write!(f, "{:?}[{} bytes]", self.id, self.payload.len())
        }
    }
}

/// Single length-prefixed unit on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Zero-length frame with no type or payload
    KeepAlive,
    Message(Message),
}

impl Frame {
    /// Read a frame from a stream
    pub async fn read<T>(reader: &mut T) -> Result<Frame, PeerError>
    where
        T: AsyncRead + Unpin,
    {
        let len = reader.read_u32().await?;
        if len == 0 {
            return Ok(Frame::KeepAlive);
        }
        if len > MAX_MESSAGE_LEN {
            return Err(PeerError::MessageTooLong(len));
        }

        let id = reader.read_u8().await?;
        let mut payload = vec![0; len as usize - 1];
        reader.read_exact(&mut payload).await?;
        let message = Message::new(MessageId::try_from(id)?, payload);
        trace!("received {}", message);
        Ok(Frame::Message(message))
    }

    /// Serialise [`Frame`] to raw bytes
    pub fn serialise(&self) -> Vec<u8> {
        match self {
            Frame::KeepAlive => 0u32.to_be_bytes().to_vec(),
            Frame::Message(message) => message.serialise(),
        }
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        Frame::Message(message)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::KeepAlive => write!(f, "KeepAlive"),
            Frame::Message(message) => write!(f, "{}", message),
        }
    }
}
