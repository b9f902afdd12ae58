use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::decode::{decode, DecodeError};
use crate::metainfo::Metainfo;
use crate::{peer_id, BencodeType, INFO_HASH_LEN, PEER_ID_LEN};

const INTERVAL_KEY: &str = "interval";
const MIN_INTERVAL_KEY: &str = "min interval";
const COMPLETE_KEY: &str = "complete";
const INCOMPLETE_KEY: &str = "incomplete";
const PEERS_KEY: &str = "peers";
const FAILURE_REASON_KEY: &str = "failure reason";
const WARNING_MESSAGE_KEY: &str = "warning message";
/// Bytes per peer in a compact peer list: IPv4 address then port
const COMPACT_PEER_LEN: usize = 6;

/// Errors from announcing to a tracker
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid announce URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to decode tracker response: {0}")]
    Decode(#[from] DecodeError),
    #[error("tracker response is not a dictionary")]
    NotADictionary,
    #[error("tracker returned failure: {0}")]
    Failure(String),
    #[error("missing or invalid interval")]
    MissingOrInvalidInterval,
    #[error("missing or invalid peers")]
    MissingOrInvalidPeers,
    #[error("peer list length {0} is not a multiple of 6")]
    InvalidPeerListLength(usize),
}

/// Peer of file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    /// IP address of peer
    pub ip: Ipv4Addr,
    /// Port of peer
    pub port: u16,
}

impl Peer {
    pub fn new(ip: Ipv4Addr, port: u16) -> Peer {
        Peer { ip, port }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.ip, self.port))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<Peer> for SocketAddr {
    fn from(peer: Peer) -> Self {
        peer.addr()
    }
}

/// Parse peers encoded in "compact" form, keeping the tracker's order
pub fn parse_peers(data: &[u8]) -> Result<Vec<Peer>, TrackerError> {
    if data.len() % COMPACT_PEER_LEN != 0 {
        return Err(TrackerError::InvalidPeerListLength(data.len()));
    }
    let peers = data
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            Peer::new(
                Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]),
                u16::from_be_bytes([chunk[4], chunk[5]]),
            )
        })
        .collect();
    Ok(peers)
}

/// Percent-encode every byte, as trackers expect for raw binary query values
fn percent_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("%{:02x}", byte))
        .collect::<Vec<String>>()
        .join("")
}

/// GET request to tracker
#[derive(Debug)]
pub struct Request {
    /// URL to make GET request to tracker
    pub url: Url,
}

impl Request {
    /// Create announce request for a download that hasn't started yet
    pub fn new(
        tracker_url: &str,
        peer_id: &[u8; PEER_ID_LEN],
        port: u16,
        info_hash: &[u8; INFO_HASH_LEN],
        left: i64,
    ) -> Result<Request, TrackerError> {
        let mut url = Url::parse(tracker_url)?;
        // Binary values are encoded by hand since `query_pairs_mut` only takes UTF-8
        let binary_pairs = format!(
            "info_hash={}&peer_id={}",
            percent_encode(info_hash),
            percent_encode(peer_id)
        );
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, binary_pairs),
            _ => binary_pairs,
        };
        url.set_query(Some(&query));
        url.query_pairs_mut()
            .append_pair("port", &port.to_string())
            .append_pair("uploaded", &0.to_string())
            .append_pair("downloaded", &0.to_string())
            .append_pair("compact", &1.to_string())
            .append_pair("left", &left.to_string());
        Ok(Request { url })
    }

    /// Send request and return response body
    ///
    /// Non-2xx statuses are errors.
    pub async fn send(&self) -> Result<Bytes, TrackerError> {
        let response = reqwest::get(self.url.clone()).await?.error_for_status()?;
        Ok(response.bytes().await?)
    }
}

/// Successful response from tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Interval (in seconds) at which to reconnect to tracker to refresh peer list
    pub interval: i64,
    pub min_interval: Option<i64>,
    /// Number of seeders
    pub complete: Option<i64>,
    /// Number of leechers
    pub incomplete: Option<i64>,
    /// Peers of file reported by tracker
    pub peers: Vec<Peer>,
}

impl Response {
    /// Deserialise response message body
    pub fn deserialise(data: &[u8]) -> Result<Response, TrackerError> {
        let (value, _) = decode(data)?;
        if value.as_dict().is_none() {
            return Err(TrackerError::NotADictionary);
        }

        if let Some(reason) = value.get(FAILURE_REASON_KEY).and_then(BencodeType::as_bytes) {
            return Err(TrackerError::Failure(
                String::from_utf8_lossy(reason).into_owned(),
            ));
        }
        if let Some(message) = value.get(WARNING_MESSAGE_KEY).and_then(BencodeType::as_bytes) {
            warn!("tracker warning: {}", String::from_utf8_lossy(message));
        }

        let interval = value
            .get(INTERVAL_KEY)
            .and_then(BencodeType::as_integer)
            .ok_or(TrackerError::MissingOrInvalidInterval)?;
        let peer_data = value
            .get(PEERS_KEY)
            .and_then(BencodeType::as_bytes)
            .ok_or(TrackerError::MissingOrInvalidPeers)?;
        let optional_int = |key: &str| value.get(key).and_then(BencodeType::as_integer);

        Ok(Response {
            interval,
            min_interval: optional_int(MIN_INTERVAL_KEY),
            complete: optional_int(COMPLETE_KEY),
            incomplete: optional_int(INCOMPLETE_KEY),
            peers: parse_peers(peer_data)?,
        })
    }
}

/// Announce to the torrent's tracker as `peer_id`, listening on `port`
#[instrument(skip_all, fields(tracker = %metainfo.announce))]
pub async fn announce(
    metainfo: &Metainfo,
    peer_id: &[u8; PEER_ID_LEN],
    port: u16,
) -> Result<Response, TrackerError> {
    let request = Request::new(
        &metainfo.announce,
        peer_id,
        port,
        &metainfo.info_hash(),
        metainfo.total_length(),
    )?;
    let body = request.send().await?;
    let response = Response::deserialise(&body)?;
    debug!(
        interval = response.interval,
        peers = response.peers.len(),
        "tracker responded"
    );
    Ok(response)
}

/// Ask the torrent's tracker for peers, announcing under a freshly generated peer id
pub async fn request_peers(metainfo: &Metainfo, port: u16) -> Result<Vec<Peer>, TrackerError> {
    let response = announce(metainfo, &peer_id::generate(), port).await?;
    Ok(response.peers)
}
