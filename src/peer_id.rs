use rand::Rng;

use crate::PEER_ID_LEN;

/// Azureus-style client prefix, identifying this client and its version
pub const PEER_ID_PREFIX: &[u8; 8] = b"-BC0001-";

/// Generate a peer id: the client prefix followed by random bytes
pub fn generate() -> [u8; PEER_ID_LEN] {
    generate_with(&mut rand::thread_rng())
}

/// Generate a peer id drawing the random suffix from `rng`
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> [u8; PEER_ID_LEN] {
    let mut id = [0; PEER_ID_LEN];
    id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
    rng.fill(&mut id[PEER_ID_PREFIX.len()..]);
    id
}
