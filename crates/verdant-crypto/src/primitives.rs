//! Symmetric primitives: HKDF, AES-256-GCM, SHA-256.

use crate::{CryptoError, CryptoResult};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

/// AES-256 key length.
pub const AEAD_KEY_LEN: usize = 32;
/// GCM nonce length.
pub const AEAD_IV_LEN: usize = 12;
/// GCM authentication-tag length.
pub const AEAD_TAG_LEN: usize = 16;
/// SHA-256 digest length.
pub const SHA256_LEN: usize = 32;

/// HKDF-SHA256 extract-and-expand.
pub fn hkdf_sha256(
    salt: &[u8],
    ikm: &[u8],
    info: &[u8],
    out_len: usize,
) -> CryptoResult<Vec<u8>> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = vec![0u8; out_len];
    hkdf.expand(info, &mut okm)
        .map_err(|_| CryptoError::InvalidArgument(format!("HKDF output length {out_len}")))?;
    Ok(okm)
}

/// Seal `plaintext` under AES-256-GCM. Returns `ciphertext ‖ tag`.
pub fn aead_seal(
    key: &[u8; AEAD_KEY_LEN],
    iv: &[u8; AEAD_IV_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidArgument("AEAD key length".into()))?;
    cipher
        .encrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Crypto("AEAD seal failed".into()))
}

/// Open an AES-256-GCM frame (`ciphertext ‖ tag`). The tag check is
/// constant-time inside the cipher; failure is indistinguishable from any
/// other tamper.
pub fn aead_open(
    key: &[u8; AEAD_KEY_LEN],
    iv: &[u8; AEAD_IV_LEN],
    aad: &[u8],
    sealed: &[u8],
) -> CryptoResult<Vec<u8>> {
    if sealed.len() < AEAD_TAG_LEN {
        return Err(CryptoError::InvalidArgument(
            "sealed frame shorter than the tag".into(),
        ));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidArgument("AEAD key length".into()))?;
    cipher
        .decrypt(Nonce::from_slice(iv), Payload { msg: sealed, aad })
        .map_err(|_| CryptoError::Auth)
}

/// One-shot SHA-256.
pub fn sha256(data: &[u8]) -> [u8; SHA256_LEN] {
    let mut out = [0u8; SHA256_LEN];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Incremental SHA-256 for streamed firmware images.
#[derive(Default)]
pub struct Sha256Stream {
    inner: Sha256,
}

impl Sha256Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finish(self) -> [u8; SHA256_LEN] {
        let mut out = [0u8; SHA256_LEN];
        out.copy_from_slice(&self.inner.finalize());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 5869, test case 1.
    #[test]
    fn hkdf_matches_rfc5869_vector() {
        let ikm = [0x0bu8; 22];
        let salt: Vec<u8> = (0x00u8..=0x0c).collect();
        let info: Vec<u8> = (0xf0u8..=0xf9).collect();
        let okm = hkdf_sha256(&salt, &ikm, &info, 42).unwrap();
        let expected = hex::decode(
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865",
        )
        .unwrap();
        assert_eq!(okm, expected);
    }

    #[test]
    fn hkdf_empty_salt_is_accepted() {
        let okm = hkdf_sha256(b"", b"ikm", b"info", 32).unwrap();
        assert_eq!(okm.len(), 32);
    }

    #[test]
    fn hkdf_is_deterministic_and_info_bound() {
        let a = hkdf_sha256(b"salt", b"secret", b"pop-1", 32).unwrap();
        let b = hkdf_sha256(b"salt", b"secret", b"pop-1", 32).unwrap();
        let c = hkdf_sha256(b"salt", b"secret", b"pop-2", 32).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hkdf_rejects_absurd_length() {
        // SHA-256 HKDF caps output at 255 * 32 bytes.
        assert!(hkdf_sha256(b"", b"ikm", b"", 256 * 32).is_err());
    }

    #[test]
    fn aead_seal_open_roundtrip() {
        let key = [7u8; AEAD_KEY_LEN];
        let iv = [9u8; AEAD_IV_LEN];
        let sealed = aead_seal(&key, &iv, b"aad", b"light to 80").unwrap();
        assert_eq!(sealed.len(), b"light to 80".len() + AEAD_TAG_LEN);
        let opened = aead_open(&key, &iv, b"aad", &sealed).unwrap();
        assert_eq!(opened, b"light to 80");
    }

    #[test]
    fn aead_open_rejects_tampered_ciphertext() {
        let key = [7u8; AEAD_KEY_LEN];
        let iv = [9u8; AEAD_IV_LEN];
        let mut sealed = aead_seal(&key, &iv, b"", b"payload").unwrap();
        sealed[0] ^= 0x01;
        assert!(matches!(
            aead_open(&key, &iv, b"", &sealed),
            Err(CryptoError::Auth)
        ));
    }

    #[test]
    fn aead_open_rejects_wrong_key_iv_aad() {
        let key = [7u8; AEAD_KEY_LEN];
        let iv = [9u8; AEAD_IV_LEN];
        let sealed = aead_seal(&key, &iv, b"aad", b"payload").unwrap();

        let wrong_key = [8u8; AEAD_KEY_LEN];
        assert!(aead_open(&wrong_key, &iv, b"aad", &sealed).is_err());

        let wrong_iv = [0u8; AEAD_IV_LEN];
        assert!(aead_open(&key, &wrong_iv, b"aad", &sealed).is_err());

        assert!(aead_open(&key, &iv, b"other", &sealed).is_err());
    }

    #[test]
    fn aead_open_rejects_truncated_frame() {
        let key = [7u8; AEAD_KEY_LEN];
        let iv = [9u8; AEAD_IV_LEN];
        assert!(matches!(
            aead_open(&key, &iv, b"", &[0u8; AEAD_TAG_LEN - 1]),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn aead_empty_plaintext_roundtrips() {
        let key = [1u8; AEAD_KEY_LEN];
        let iv = [2u8; AEAD_IV_LEN];
        let sealed = aead_seal(&key, &iv, b"", b"").unwrap();
        assert_eq!(sealed.len(), AEAD_TAG_LEN);
        assert!(aead_open(&key, &iv, b"", &sealed).unwrap().is_empty());
    }

    // FIPS 180-2 appendix B.1.
    #[test]
    fn sha256_known_answer() {
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data = vec![0x5au8; 10_000];
        let mut stream = Sha256Stream::new();
        for chunk in data.chunks(777) {
            stream.update(chunk);
        }
        assert_eq!(stream.finish(), sha256(&data));
    }

    #[test]
    fn empty_stream_matches_empty_hash() {
        let stream = Sha256Stream::new();
        assert_eq!(stream.finish(), sha256(b""));
    }
}
