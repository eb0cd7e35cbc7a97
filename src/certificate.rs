use crate::delegate::DelegateCertificate;
use crate::error::{Error, Result};
use crate::keys::PK_SIZE;
use crate::utils::{decode, encode, G2_SIZE};
use serde::{Deserialize, Serialize};

/// The artifact handed to a donor: their public key, the delegate's
/// signature on it, and the delegate's own certificate.
///
/// Self-contained: checking it needs nothing but the master public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorCertificate {
    pub donor_public_key: Vec<u8>,
    pub unblinded_signature: Vec<u8>,
    pub delegate_certificate: DelegateCertificate,
}

impl DonorCertificate {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes, "donor certificate")
    }

    pub fn amount(&self) -> u64 {
        self.delegate_certificate.amount()
    }
}

/// Packages the pieces of an issuance. No cryptography happens here; see
/// [`crate::verify`] for that.
pub fn assemble(
    donor_public_key: &[u8],
    unblinded_signature: &[u8],
    delegate_certificate: DelegateCertificate,
) -> Result<DonorCertificate> {
    if donor_public_key.len() != PK_SIZE {
        return Err(Error::MalformedInput(format!(
            "donor public key must be {} bytes, got {}",
            PK_SIZE,
            donor_public_key.len()
        )));
    }
    if unblinded_signature.len() != G2_SIZE {
        return Err(Error::MalformedInput(format!(
            "signature must be {} bytes, got {}",
            G2_SIZE,
            unblinded_signature.len()
        )));
    }
    if delegate_certificate.delegate_public_key.len() != PK_SIZE {
        return Err(Error::MalformedInput(format!(
            "delegate public key must be {} bytes, got {}",
            PK_SIZE,
            delegate_certificate.delegate_public_key.len()
        )));
    }

    Ok(DonorCertificate {
        donor_public_key: donor_public_key.to_vec(),
        unblinded_signature: unblinded_signature.to_vec(),
        delegate_certificate,
    })
}
