use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::handshake::Handshake;
use crate::message::MessageId;
use crate::tracker::Peer;
use crate::{to_hex, INFO_HASH_LEN, PEER_ID_LEN};

/// Bound on opening a connection and exchanging handshakes with a single peer
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from talking to a peer
#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("protocol string length is 0")]
    ZeroProtocolLength,
    #[error("protocol string is {0} bytes, longer than 255")]
    ProtocolStringTooLong(usize),
    #[error("Info hash mismatch: us={}, peer={}", to_hex(.expected), to_hex(.actual))]
    InfoHashMismatch {
        expected: [u8; INFO_HASH_LEN],
        actual: [u8; INFO_HASH_LEN],
    },
    #[error("unknown message id {0}")]
    UnknownMessageId(u8),
    #[error("message length {0} exceeds limit")]
    MessageTooLong(u32),
    #[error("expected {expected:?} message, got {actual:?}")]
    UnexpectedMessage {
        expected: MessageId,
        actual: MessageId,
    },
    #[error("have payload is {0} bytes, expected 4")]
    InvalidHavePayload(usize),
    #[error("request payload is {0} bytes, expected 12")]
    InvalidRequestPayload(usize),
    #[error("piece payload is {0} bytes, expected at least 8")]
    InvalidPiecePayload(usize),
    #[error("port payload is {0} bytes, expected 2")]
    InvalidPortPayload(usize),
    #[error("expected piece index {expected}, got {actual}")]
    UnexpectedPieceIndex { expected: u32, actual: u32 },
}

/// Send our handshake and read the peer's, checking both refer to the same torrent
#[instrument(skip_all)]
pub async fn handshake<T>(
    socket: &mut T,
    info_hash: [u8; INFO_HASH_LEN],
    peer_id: [u8; PEER_ID_LEN],
) -> Result<Handshake, PeerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let initial_handshake = Handshake::new(info_hash, peer_id);
    socket.write_all(&initial_handshake.serialise()).await?;

    let response_handshake = Handshake::deserialise(socket).await?;
    if response_handshake.info_hash() != initial_handshake.info_hash() {
        return Err(PeerError::InfoHashMismatch {
            expected: info_hash,
            actual: *response_handshake.info_hash(),
        });
    }
    debug!(
        remote_peer_id = %to_hex(response_handshake.peer_id()),
        "handshake complete"
    );
    Ok(response_handshake)
}

/// Connect to a peer and exchange handshakes, giving back the open connection
///
/// The connection is dropped, and so closed, on every error path.
#[instrument(skip(info_hash, peer_id))]
pub async fn perform_handshake(
    addr: SocketAddr,
    info_hash: [u8; INFO_HASH_LEN],
    peer_id: [u8; PEER_ID_LEN],
) -> Result<(Handshake, TcpStream), PeerError> {
    let exchange = async {
        let mut stream = TcpStream::connect(addr).await?;
        let remote = handshake(&mut stream, info_hash, peer_id).await?;
        Ok::<_, PeerError>((remote, stream))
    };
    tokio::time::timeout(CONNECT_TIMEOUT, exchange)
        .await
        .map_err(|_| PeerError::Timeout(CONNECT_TIMEOUT))?
}

/// Race handshakes against several peers and keep the first that succeeds
///
/// Each attempt runs on its own task and is bounded by `attempt_timeout`. Failed attempts are
/// logged and skipped; once one succeeds the rest are aborted.
#[instrument(skip_all, fields(peers = peers.len()))]
pub async fn first_handshake(
    peers: &[Peer],
    info_hash: [u8; INFO_HASH_LEN],
    peer_id: [u8; PEER_ID_LEN],
    attempt_timeout: Duration,
) -> Option<(Peer, Handshake, TcpStream)> {
    let mut attempts = JoinSet::new();
    for &peer in peers {
        attempts.spawn(async move {
            let attempt = perform_handshake(peer.addr(), info_hash, peer_id);
            let res = tokio::time::timeout(attempt_timeout, attempt)
                .await
                .unwrap_or_else(|_| Err(PeerError::Timeout(attempt_timeout)));
            (peer, res)
        });
    }

    while let Some(joined) = attempts.join_next().await {
        match joined {
            Ok((peer, Ok((handshake, stream)))) => {
                info!(%peer, "handshake successful");
                return Some((peer, handshake, stream));
            }
            Ok((peer, Err(e))) => warn!(%peer, "handshake failed: {}", e),
            Err(e) => warn!("handshake task failed: {}", e),
        }
    }
    None
}
