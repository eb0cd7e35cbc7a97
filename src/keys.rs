use crate::error::{Error, Result};
use blsttc::{PublicKey, SecretKey};
use rand::{CryptoRng, RngCore};
use std::convert::TryInto;
use std::fmt;

/// Compressed G1 public key size.
pub const PK_SIZE: usize = 48;
/// Big-endian scalar secret key size.
pub const SK_SIZE: usize = 32;

// A masked 32 byte draw lands below the group order ~90% of the time.
const MAX_KEYGEN_ATTEMPTS: usize = 64;

/// A BLS12-381 signing keypair.
///
/// Used for the master key, for every delegate key and for donor keys. The
/// public key is always derived from the secret key, never stored on its own.
#[derive(Clone)]
pub struct KeyPair {
    sk: SecretKey,
    pk: PublicKey,
}

impl KeyPair {
    /// Draws a fresh secret key from `rng`.
    ///
    /// Fails with [`Error::KeyGeneration`] when the random source reports an
    /// error.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let sk = random_secret_key(rng)?;
        Ok(Self::from(sk))
    }

    /// Rebuilds a keypair from its 32 byte secret key encoding.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let b: [u8; SK_SIZE] = bytes.try_into().map_err(|_| {
            Error::MalformedInput(format!(
                "secret key must be {} bytes, got {}",
                SK_SIZE,
                bytes.len()
            ))
        })?;
        if b == [0u8; SK_SIZE] {
            return Err(Error::MalformedInput("secret key is zero".into()));
        }
        let sk = SecretKey::from_bytes(b)
            .map_err(|e| Error::MalformedInput(format!("invalid secret key: {:?}", e)))?;
        Ok(Self::from(sk))
    }

    pub fn public_key(&self) -> PublicKey {
        self.pk
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.sk
    }

    pub fn public_key_bytes(&self) -> [u8; PK_SIZE] {
        self.pk.to_bytes()
    }

    pub fn secret_key_bytes(&self) -> [u8; SK_SIZE] {
        self.sk.to_bytes()
    }
}

impl From<SecretKey> for KeyPair {
    fn from(sk: SecretKey) -> Self {
        let pk = sk.public_key();
        Self { sk, pk }
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.pk == other.pk && self.sk.to_bytes() == other.sk.to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("pk", &self.pk)
            .field("sk", &"<redacted>")
            .finish()
    }
}

/// Parses a 48 byte compressed public key.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    let b: [u8; PK_SIZE] = bytes.try_into().map_err(|_| {
        Error::MalformedInput(format!(
            "public key must be {} bytes, got {}",
            PK_SIZE,
            bytes.len()
        ))
    })?;
    PublicKey::from_bytes(b)
        .map_err(|e| Error::MalformedInput(format!("invalid public key: {:?}", e)))
}

/// Rejection-samples a nonzero scalar below the group order.
pub(crate) fn random_secret_key<R: RngCore + CryptoRng>(rng: &mut R) -> Result<SecretKey> {
    for _ in 0..MAX_KEYGEN_ATTEMPTS {
        let mut bytes = [0u8; SK_SIZE];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        // the order is below 2^255, so the top bit would always be rejected
        bytes[0] &= 0x7f;
        if bytes == [0u8; SK_SIZE] {
            continue;
        }
        if let Ok(sk) = SecretKey::from_bytes(bytes) {
            return Ok(sk);
        }
    }
    Err(Error::KeyGeneration(
        "random source did not yield a valid scalar".into(),
    ))
}
