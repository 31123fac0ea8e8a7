//! ECIES over P-256
//!
//! Encryption to a recipient's 64-byte uncompressed public key:
//! 1. Generate an ephemeral P-256 keypair
//! 2. ECDH against the recipient key (32-byte shared x-coordinate)
//! 3. Derive the symmetric key as SHA-256 of the shared secret
//! 4. AES-256-CTR encrypt with a zero IV
//! 5. Emit `ephemeral_public(64) ‖ ciphertext`
//!
//! The zero IV is safe only because every encryption uses a fresh ephemeral
//! key; an ephemeral keypair must never be reused.
//!
//! Public keys travel as 64 uncompressed bytes (X ‖ Y, no SEC1 tag);
//! private keys are 32-byte scalars.

use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::generic_array::GenericArray;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, PublicKey, SecretKey};
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha256};

use crate::crypto::aes;
use crate::packet::PayloadBuf;
use crate::{Error, Result};

/// Length of an uncompressed public key (X ‖ Y, no tag byte)
pub const PUBLIC_KEY_LEN: usize = 64;

/// Length of a private key scalar
pub const PRIVATE_KEY_LEN: usize = 32;

/// Generate a fresh P-256 keypair as raw byte arrays
pub fn generate_keypair(
    rng: &mut impl CryptoRngCore,
) -> ([u8; PUBLIC_KEY_LEN], [u8; PRIVATE_KEY_LEN]) {
    let secret = SecretKey::random(rng);
    let public = public_key_bytes(&secret.public_key());
    (public, secret.to_bytes().into())
}

/// Derive the 64-byte public key for a stored private key
pub fn derive_public_key(private: &[u8]) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let secret = parse_private(private)?;
    Ok(public_key_bytes(&secret.public_key()))
}

/// SHA-256 of the ECDH shared secret between a private and a public key
///
/// This is both the ECIES symmetric key (with an ephemeral private key) and
/// the inclusion-response MIC key (with the static device keys).
pub fn shared_key(private: &[u8], peer_public: &[u8]) -> Result<[u8; 32]> {
    let secret = parse_private(private)?;
    let public = parse_public(peer_public)?;
    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let mut hasher = Sha256::new();
    hasher.update(shared.raw_secret_bytes());
    Ok(hasher.finalize().into())
}

/// Encrypt `plaintext` to a 64-byte recipient public key
///
/// Output is `ephemeral_public(64) ‖ ciphertext`.
pub fn encrypt(
    rng: &mut impl CryptoRngCore,
    recipient_public: &[u8],
    plaintext: &[u8],
) -> Result<PayloadBuf> {
    let recipient = parse_public(recipient_public)?;
    let ephemeral = SecretKey::random(rng);
    let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());
    let mut hasher = Sha256::new();
    hasher.update(shared.raw_secret_bytes());
    let key: [u8; 32] = hasher.finalize().into();

    let mut out = PayloadBuf::new();
    out.extend_from_slice(&public_key_bytes(&ephemeral.public_key()))
        .map_err(|_| Error::PacketTooLong)?;
    let start = out.len();
    out.extend_from_slice(plaintext).map_err(|_| Error::PacketTooLong)?;
    aes::encrypt_in_place(&key, &mut out[start..]);
    Ok(out)
}

/// Decrypt an ECIES envelope with a 32-byte private key
pub fn decrypt(private: &[u8], data: &[u8]) -> Result<PayloadBuf> {
    if data.len() < PUBLIC_KEY_LEN + 1 {
        return Err(Error::InvalidLength);
    }
    let key = shared_key(private, &data[..PUBLIC_KEY_LEN])?;

    let mut out = PayloadBuf::new();
    out.extend_from_slice(&data[PUBLIC_KEY_LEN..])
        .map_err(|_| Error::InvalidLength)?;
    aes::decrypt_in_place(&key, &mut out);
    Ok(out)
}

fn public_key_bytes(public: &PublicKey) -> [u8; PUBLIC_KEY_LEN] {
    let point = public.to_encoded_point(false);
    let mut bytes = [0u8; PUBLIC_KEY_LEN];
    // Skip the SEC1 0x04 tag byte.
    bytes.copy_from_slice(&point.as_bytes()[1..PUBLIC_KEY_LEN + 1]);
    bytes
}

fn parse_public(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(Error::InvalidKeyLength);
    }
    let point = EncodedPoint::from_untagged_bytes(GenericArray::from_slice(bytes));
    Option::<PublicKey>::from(PublicKey::from_encoded_point(&point)).ok_or(Error::CryptoSetup)
}

fn parse_private(bytes: &[u8]) -> Result<SecretKey> {
    if bytes.len() != PRIVATE_KEY_LEN {
        return Err(Error::InvalidKeyLength);
    }
    SecretKey::from_slice(bytes).map_err(|_| Error::CryptoSetup)
}
