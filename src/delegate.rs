use crate::error::{Error, Result, VerificationError};
use crate::keys::{public_key_from_bytes, KeyPair};
use crate::utils::{decode, encode, G2_SIZE};
use blsttc::{PublicKey, SecretKey, Signature};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::convert::TryInto;

/// The only action delegate keys are issued for.
pub const DONATION_ACTION: &str = "donation";

const DELEGATE_DOMAIN: &str = "freenet-ghostkey-delegate-v1";

/// What a delegate key is allowed to certify.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegateMetadata {
    pub action: String,
    pub amount: u64,
    /// Unix seconds.
    #[serde(alias = "timestamp")]
    pub created_at: u64,
}

impl DelegateMetadata {
    pub fn donation(amount: u64, created_at: u64) -> Self {
        Self {
            action: DONATION_ACTION.to_string(),
            amount,
            created_at,
        }
    }

    pub(crate) fn check(&self) -> std::result::Result<(), VerificationError> {
        if self.amount == 0 {
            return Err(VerificationError::MetadataInvalid(
                "amount must be positive".into(),
            ));
        }
        if self.action != DONATION_ACTION {
            return Err(VerificationError::MetadataInvalid(format!(
                "unexpected action {:?}",
                self.action
            )));
        }
        Ok(())
    }
}

/// The exact bytes the master key signs.
#[derive(Serialize)]
struct DelegateSigningPayload<'a> {
    domain: &'a str,
    delegate_public_key: &'a [u8],
    metadata: &'a DelegateMetadata,
}

/// A delegate public key bound to its metadata by the master key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateCertificate {
    pub delegate_public_key: Vec<u8>,
    pub metadata: DelegateMetadata,
    pub master_signature: Vec<u8>,
}

impl DelegateCertificate {
    pub(crate) fn signing_payload(
        delegate_public_key: &[u8],
        metadata: &DelegateMetadata,
    ) -> Result<Vec<u8>> {
        encode(&DelegateSigningPayload {
            domain: DELEGATE_DOMAIN,
            delegate_public_key,
            metadata,
        })
    }

    /// Checks the master signature over `(delegate_public_key, metadata)`.
    pub fn verify(
        &self,
        master_public_key: &PublicKey,
    ) -> std::result::Result<(), VerificationError> {
        let payload = Self::signing_payload(&self.delegate_public_key, &self.metadata)
            .map_err(|_| VerificationError::DelegateChainInvalid)?;
        let sig_bytes: [u8; G2_SIZE] = self
            .master_signature
            .as_slice()
            .try_into()
            .map_err(|_| VerificationError::DelegateChainInvalid)?;
        let sig = Signature::from_bytes(sig_bytes)
            .map_err(|_| VerificationError::DelegateChainInvalid)?;
        if master_public_key.verify(&sig, payload) {
            Ok(())
        } else {
            Err(VerificationError::DelegateChainInvalid)
        }
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        public_key_from_bytes(&self.delegate_public_key)
    }

    pub fn amount(&self) -> u64 {
        self.metadata.amount
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes, "delegate certificate")
    }
}

/// Generates a delegate key for `amount`, certified by the master key.
///
/// Each call produces a new key. Keeping one or several certificates for the
/// same amount is up to the caller.
pub fn generate_delegate<R: RngCore + CryptoRng>(
    master_secret_key: &SecretKey,
    amount: u64,
    now: u64,
    rng: &mut R,
) -> Result<(KeyPair, DelegateCertificate)> {
    generate_delegate_from_metadata(
        master_secret_key,
        DelegateMetadata::donation(amount, now),
        rng,
    )
}

pub fn generate_delegate_from_metadata<R: RngCore + CryptoRng>(
    master_secret_key: &SecretKey,
    metadata: DelegateMetadata,
    rng: &mut R,
) -> Result<(KeyPair, DelegateCertificate)> {
    if metadata.amount == 0 {
        return Err(Error::InvalidAmount(metadata.amount));
    }
    metadata.check()?;

    let delegate = KeyPair::generate(rng)?;
    let delegate_public_key = delegate.public_key_bytes().to_vec();

    let payload = DelegateCertificate::signing_payload(&delegate_public_key, &metadata)?;
    let master_signature = master_secret_key.sign(payload).to_bytes().to_vec();

    tracing::debug!(
        amount = metadata.amount,
        created_at = metadata.created_at,
        "generated delegate key"
    );

    let cert = DelegateCertificate {
        delegate_public_key,
        metadata,
        master_signature,
    };
    Ok((delegate, cert))
}
