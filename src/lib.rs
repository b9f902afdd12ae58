pub mod client;
pub mod decode;
pub mod encode;
pub mod handshake;
pub mod message;
pub mod metainfo;
pub mod peer_id;
pub mod tracker;

use std::collections::HashMap;

/// Protocol identifier sent in the handshake
pub const PSTR: &str = "BitTorrent protocol";
/// Length of a SHA1 digest, used for both the info hash and piece hashes
pub const INFO_HASH_LEN: usize = 20;
/// Length of a peer id
pub const PEER_ID_LEN: usize = 20;

/// Lowercase hex rendering of raw bytes, as used for info hashes and peer ids in output
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<String>>()
        .join("")
}

/// Decoded bencode value
#[derive(Debug, Clone, PartialEq)]
pub enum BencodeType {
    Integer(i64),
    ByteString(Vec<u8>),
    List(Vec<BencodeType>),
    Dict(HashMap<Vec<u8>, BencodeType>),
}

impl BencodeType {
    /// Build a byte string value from anything byte-like
    pub fn string(value: impl AsRef<[u8]>) -> BencodeType {
        BencodeType::ByteString(value.as_ref().to_vec())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeType::Integer(int) => Some(*int),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeType::ByteString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Byte string value, only if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn as_list(&self) -> Option<&[BencodeType]> {
        match self {
            BencodeType::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HashMap<Vec<u8>, BencodeType>> {
        match self {
            BencodeType::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    /// Look up a key, if this value is a dict
    pub fn get(&self, key: &str) -> Option<&BencodeType> {
        self.as_dict().and_then(|dict| dict.get(key.as_bytes()))
    }
}

impl From<i64> for BencodeType {
    fn from(value: i64) -> Self {
        BencodeType::Integer(value)
    }
}

impl From<&str> for BencodeType {
    fn from(value: &str) -> Self {
        BencodeType::string(value)
    }
}

impl From<Vec<u8>> for BencodeType {
    fn from(value: Vec<u8>) -> Self {
        BencodeType::ByteString(value)
    }
}
