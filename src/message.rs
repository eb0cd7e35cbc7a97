//! Messages signed with a certified donor key.
//!
//! A [`MessageSignature`] carries the donor certificate along with the
//! signature, so anyone holding the master public key can check both the
//! message and the donation behind the key that signed it.

use crate::armor::{armor, dearmor};
use crate::certificate::DonorCertificate;
use crate::error::{Error, Result, VerificationError};
use crate::keys::{public_key_from_bytes, KeyPair};
use crate::utils::{decode, encode, G2_SIZE};
use crate::verify::{verify, VerifiedInfo};
use blsttc::{PublicKey, Signature};
use serde::{Deserialize, Serialize};
use std::convert::TryInto;

pub const SIGNATURE_LABEL: &str = "FREENET GHOSTKEY SIGNATURE";

// Fixed length, so the message that follows needs no framing.
const MESSAGE_DOMAIN: &[u8] = b"freenet-ghostkey-message-v1\0";

/// A detached signature over a message, with the certificate of the key
/// that made it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSignature {
    pub certificate: DonorCertificate,
    pub signature: Vec<u8>,
}

impl MessageSignature {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes, "message signature")
    }

    pub fn to_armored(&self) -> Result<String> {
        Ok(armor(SIGNATURE_LABEL, &self.to_bytes()?))
    }

    pub fn from_armored(text: &str) -> Result<Self> {
        Self::from_bytes(&dearmor(SIGNATURE_LABEL, text)?)
    }
}

fn message_payload(message: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(MESSAGE_DOMAIN.len() + message.len());
    payload.extend_from_slice(MESSAGE_DOMAIN);
    payload.extend_from_slice(message);
    payload
}

/// Signs `message` with the donor key that `certificate` certifies.
pub fn sign_message(
    donor_key: &KeyPair,
    certificate: &DonorCertificate,
    message: &[u8],
) -> Result<MessageSignature> {
    if certificate.donor_public_key != donor_key.public_key_bytes().to_vec() {
        return Err(Error::MalformedInput(
            "secret key does not belong to the certificate".into(),
        ));
    }
    let sig = donor_key.secret_key().sign(message_payload(message));
    tracing::debug!(len = message.len(), "signed message");
    Ok(MessageSignature {
        certificate: certificate.clone(),
        signature: sig.to_bytes().to_vec(),
    })
}

/// Checks the certificate chain, then the signature on `message`.
///
/// Returns what the certificate proves about the signer.
pub fn verify_message(
    message: &[u8],
    signed: &MessageSignature,
    master_public_key: &PublicKey,
) -> std::result::Result<VerifiedInfo, VerificationError> {
    let info = verify(&signed.certificate, master_public_key)?;

    let donor_pk = public_key_from_bytes(&signed.certificate.donor_public_key)
        .map_err(|_| VerificationError::DonorSignatureInvalid)?;
    let sig = signed
        .signature
        .as_slice()
        .try_into()
        .ok()
        .and_then(|b: [u8; G2_SIZE]| Signature::from_bytes(b).ok())
        .ok_or(VerificationError::MessageSignatureInvalid)?;
    if !donor_pk.verify(&sig, message_payload(message)) {
        return Err(VerificationError::MessageSignatureInvalid);
    }
    Ok(info)
}
