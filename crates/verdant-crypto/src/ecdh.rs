//! Ephemeral P-256 key agreement for the commissioning handshake.

use crate::{CryptoError, CryptoResult};
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;

/// Uncompressed X9.62 public-key length (0x04 prefix + two coordinates).
pub const PUBLIC_KEY_LEN: usize = 65;

/// Raw ECDH shared-secret length.
pub const SHARED_SECRET_LEN: usize = 32;

/// One side of an ephemeral Diffie-Hellman exchange.
pub struct EphemeralKeypair {
    secret: EphemeralSecret,
    public: [u8; PUBLIC_KEY_LEN],
}

impl EphemeralKeypair {
    /// Generate a fresh keypair from the OS entropy source.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut rand::thread_rng());
        let point = secret.public_key().to_encoded_point(false);
        let mut public = [0u8; PUBLIC_KEY_LEN];
        public.copy_from_slice(point.as_bytes());
        Self { secret, public }
    }

    /// The uncompressed public key to hand to the peer.
    pub fn public_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public
    }

    /// Compute the raw shared secret against the peer's uncompressed
    /// public key.
    pub fn diffie_hellman(&self, peer_pub: &[u8]) -> CryptoResult<[u8; SHARED_SECRET_LEN]> {
        if peer_pub.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidArgument(format!(
                "peer public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                peer_pub.len()
            )));
        }
        let peer = PublicKey::from_sec1_bytes(peer_pub)
            .map_err(|_| CryptoError::InvalidArgument("peer public key not on curve".into()))?;
        let shared = self.secret.diffie_hellman(&peer);
        let mut out = [0u8; SHARED_SECRET_LEN];
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }
}
