use tokio::io::{AsyncRead, AsyncReadExt};

use crate::client::PeerError;
use crate::{INFO_HASH_LEN, PEER_ID_LEN, PSTR};

/// Length of a handshake using the standard protocol identifier
pub const HANDSHAKE_BYTES_LEN: usize = 1 + PSTR.len() + HANDSHAKE_TAIL_LEN;

const RESERVED_LEN: usize = 8;
/// Bytes following the protocol string: reserved bytes, info hash and peer id
const HANDSHAKE_TAIL_LEN: usize = RESERVED_LEN + INFO_HASH_LEN + PEER_ID_LEN;

/// Protocol extensions advertised through the reserved bytes of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// Mainline DHT, bit 0 of reserved byte 7
    Dht,
    /// Extension protocol (BEP 10), bit 5 of reserved byte 5
    ExtensionProtocol,
    /// Fast extension (BEP 6), bit 7 of reserved byte 7
    Fast,
}

impl Extension {
    /// Look up an extension by its bit identifier
    ///
    /// Unknown identifiers give `None`; callers are expected to ignore them rather than fail.
    pub fn from_id(id: u8) -> Option<Extension> {
        match id {
            0 => Some(Extension::Dht),
            5 => Some(Extension::ExtensionProtocol),
            7 => Some(Extension::Fast),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Extension::Dht => 0,
            Extension::ExtensionProtocol => 5,
            Extension::Fast => 7,
        }
    }

    /// Index of the reserved byte holding the flag, and the flag's mask within it
    fn position(self) -> (usize, u8) {
        match self {
            Extension::Dht => (7, 0b0000_0001),
            Extension::ExtensionProtocol => (5, 0b0010_0000),
            Extension::Fast => (7, 0b1000_0000),
        }
    }
}

/// BitTorrent handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier, between 1 and 255 bytes
    pstr: Vec<u8>,
    /// Extension flags
    reserved: [u8; RESERVED_LEN],
    /// SHA1 hash of bencoded `info` dict of file
    info_hash: [u8; INFO_HASH_LEN],
    /// Identifier of peer
    peer_id: [u8; PEER_ID_LEN],
}

impl Handshake {
    /// Handshake using the standard protocol identifier and no extensions
    pub fn new(info_hash: [u8; INFO_HASH_LEN], peer_id: [u8; PEER_ID_LEN]) -> Handshake {
        Handshake {
            pstr: PSTR.as_bytes().to_vec(),
            reserved: [0; RESERVED_LEN],
            info_hash,
            peer_id,
        }
    }

    /// Handshake with a custom protocol identifier
    pub fn with_protocol(
        pstr: Vec<u8>,
        info_hash: [u8; INFO_HASH_LEN],
        peer_id: [u8; PEER_ID_LEN],
    ) -> Result<Handshake, PeerError> {
        match pstr.len() {
            0 => Err(PeerError::ZeroProtocolLength),
            len if len > u8::MAX as usize => Err(PeerError::ProtocolStringTooLong(len)),
            _ => Ok(Handshake {
                pstr,
                reserved: [0; RESERVED_LEN],
                info_hash,
                peer_id,
            }),
        }
    }

    pub fn pstr(&self) -> &[u8] {
        &self.pstr
    }

    pub fn reserved(&self) -> &[u8; RESERVED_LEN] {
        &self.reserved
    }

    pub fn info_hash(&self) -> &[u8; INFO_HASH_LEN] {
        &self.info_hash
    }

    pub fn peer_id(&self) -> &[u8; PEER_ID_LEN] {
        &self.peer_id
    }

    /// Advertise support for an extension
    pub fn set_extension(&mut self, extension: Extension) {
        let (byte, mask) = extension.position();
        self.reserved[byte] |= mask;
    }

    /// Check whether the handshake advertises an extension
    pub fn has_extension(&self, extension: Extension) -> bool {
        let (byte, mask) = extension.position();
        self.reserved[byte] & mask != 0
    }

    /// Set an extension by its bit identifier, ignoring identifiers that aren't known
    pub fn set_extension_id(&mut self, id: u8) {
        if let Some(extension) = Extension::from_id(id) {
            self.set_extension(extension);
        }
    }

    /// Check an extension by its bit identifier; unknown identifiers are never set
    pub fn has_extension_id(&self, id: u8) -> bool {
        Extension::from_id(id).is_some_and(|extension| self.has_extension(extension))
    }

    /// Serialise handshake data
    pub fn serialise(&self) -> Vec<u8> {
        // Constructors keep `pstr` within 1..=255 bytes
        let mut output = Vec::with_capacity(1 + self.pstr.len() + HANDSHAKE_TAIL_LEN);
        output.push(self.pstr.len() as u8);
        output.extend_from_slice(&self.pstr);
        output.extend_from_slice(&self.reserved);
        output.extend_from_slice(&self.info_hash);
        output.extend_from_slice(&self.peer_id);
        output
    }

    /// Read a handshake from a stream
    ///
    /// The leading length byte decides how long the protocol identifier is, so non-standard
    /// identifiers are accepted.
    pub async fn deserialise<T>(reader: &mut T) -> Result<Handshake, PeerError>
    where
        T: AsyncRead + Unpin,
    {
        let pstr_len = reader.read_u8().await? as usize;
        if pstr_len == 0 {
            return Err(PeerError::ZeroProtocolLength);
        }

        let mut buf = vec![0; pstr_len + HANDSHAKE_TAIL_LEN];
        reader.read_exact(&mut buf).await?;
        let (pstr, rest) = buf.split_at(pstr_len);
        let (reserved_bytes, rest) = rest.split_at(RESERVED_LEN);
        let (info_hash_bytes, peer_id_bytes) = rest.split_at(INFO_HASH_LEN);

        let mut handshake = Handshake {
            pstr: pstr.to_vec(),
            reserved: [0; RESERVED_LEN],
            info_hash: [0; INFO_HASH_LEN],
            peer_id: [0; PEER_ID_LEN],
        };
        handshake.reserved.copy_from_slice(reserved_bytes);
        handshake.info_hash.copy_from_slice(info_hash_bytes);
        handshake.peer_id.copy_from_slice(peer_id_bytes);
        Ok(handshake)
    }
}
