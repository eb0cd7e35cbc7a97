use crate::certificate::DonorCertificate;
use crate::error::VerificationError;
use crate::keys::public_key_from_bytes;
use crate::utils::{verify_signature_on_message, G2_SIZE};
use blsttc::{PublicKey, Signature};
use serde::{Deserialize, Serialize};
use std::convert::TryInto;

/// What a valid certificate proves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedInfo {
    pub amount: u64,
    pub created_at: u64,
}

/// Checks the whole chain: master key → delegate certificate → donor key.
///
/// Pure and offline; the first failing check decides the error.
pub fn verify(
    cert: &DonorCertificate,
    master_public_key: &PublicKey,
) -> Result<VerifiedInfo, VerificationError> {
    let delegate = &cert.delegate_certificate;

    delegate.verify(master_public_key)?;
    delegate.metadata.check()?;

    let delegate_pk = public_key_from_bytes(&delegate.delegate_public_key)
        .map_err(|_| VerificationError::DelegateChainInvalid)?;

    // the donor key must itself be a usable public key, not just signed bytes
    public_key_from_bytes(&cert.donor_public_key)
        .map_err(|_| VerificationError::DonorSignatureInvalid)?;
    let sig = cert
        .unblinded_signature
        .as_slice()
        .try_into()
        .ok()
        .and_then(|b: [u8; G2_SIZE]| Signature::from_bytes(b).ok())
        .ok_or(VerificationError::DonorSignatureInvalid)?;
    if !verify_signature_on_message(&cert.donor_public_key, &sig, &delegate_pk) {
        tracing::debug!(amount = delegate.metadata.amount, "donor signature rejected");
        return Err(VerificationError::DonorSignatureInvalid);
    }

    Ok(VerifiedInfo {
        amount: delegate.metadata.amount,
        created_at: delegate.metadata.created_at,
    })
}
