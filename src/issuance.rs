//! Client side of an issuance, and the messages exchanged with the signing
//! service.
//!
//! The transport is not defined here. A [`SigningAuthority`] is anything that
//! can turn a [`SigningRequest`] into a [`SigningResponse`]: an HTTP client,
//! or [`crate::authority::SigningService`] in-process.

use crate::blind_sigs::{blind, unblind, BlindSignature};
use crate::certificate::{assemble, DonorCertificate};
use crate::delegate::DelegateCertificate;
use crate::error::{Error, Result};
use crate::keys::KeyPair;
use crate::verify::{verify, VerifiedInfo};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use blsttc::PublicKey;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningRequest {
    pub payment_reference: String,
    /// base64
    pub blinded_public_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateInfo {
    /// base64 of the canonical delegate certificate encoding
    pub certificate: String,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedResponse {
    /// base64
    pub blind_signature: String,
    pub delegate_info: DelegateInfo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningErrorKind {
    /// The payment reference has already produced a certificate.
    AlreadySigned,
    /// Transient; a retry with a new blinding may succeed.
    Unavailable,
    InvalidRequest,
    PaymentNotFound,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningFailure {
    pub error: SigningErrorKind,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SigningResponse {
    Signed(SignedResponse),
    Failed(SigningFailure),
}

impl SigningFailure {
    pub fn new(error: SigningErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }

    fn into_error(self, payment_reference: &str) -> Error {
        match self.error {
            SigningErrorKind::AlreadySigned => {
                Error::PaymentAlreadySigned(payment_reference.to_string())
            }
            SigningErrorKind::Unavailable => Error::SignerUnavailable(self.message),
            SigningErrorKind::InvalidRequest => Error::InvalidBlindedInput(self.message),
            SigningErrorKind::PaymentNotFound => Error::MalformedInput(format!(
                "payment {} is not known to the signer: {}",
                payment_reference, self.message
            )),
        }
    }
}

/// The single remote call in an issuance.
///
/// Implementations return `Err(Error::SignerUnavailable)` for transport
/// failures and `Ok(SigningResponse::Failed)` for answers from the service.
pub trait SigningAuthority {
    fn sign(&self, request: &SigningRequest) -> Result<SigningResponse>;
}

/// Everything a donor walks away with.
#[derive(Debug)]
pub struct IssuedCertificate {
    pub certificate: DonorCertificate,
    pub donor_key: KeyPair,
    pub info: VerifiedInfo,
}

/// Runs one issuance end to end: fresh donor key, blind, remote signature,
/// unblind, assemble, verify.
///
/// A certificate is only returned once it verifies under
/// `master_public_key`. On [`Error::SignerUnavailable`] the caller may call
/// this again; every call uses a new donor key and blinding factor.
pub fn request_certificate<A, R>(
    authority: &A,
    payment_reference: &str,
    master_public_key: &PublicKey,
    rng: &mut R,
) -> Result<IssuedCertificate>
where
    A: SigningAuthority + ?Sized,
    R: RngCore + CryptoRng,
{
    let donor_key = KeyPair::generate(rng)?;
    let donor_public_key = donor_key.public_key_bytes();
    let (blinded, ctx) = blind(&donor_public_key, rng)?;

    let request = SigningRequest {
        payment_reference: payment_reference.to_string(),
        blinded_public_key: BASE64_STANDARD.encode(blinded.to_bytes()),
    };
    tracing::debug!(payment_reference, "requesting blind signature");

    let signed = match authority.sign(&request)? {
        SigningResponse::Signed(signed) => signed,
        SigningResponse::Failed(failure) => {
            tracing::warn!(payment_reference, kind = ?failure.error, "signing refused");
            return Err(failure.into_error(payment_reference));
        }
    };

    let blind_sig_bytes = BASE64_STANDARD.decode(&signed.blind_signature)?;
    let blind_sig = BlindSignature::try_from(blind_sig_bytes.as_slice())?;
    let certificate_bytes = BASE64_STANDARD.decode(&signed.delegate_info.certificate)?;
    let delegate_certificate = DelegateCertificate::from_bytes(&certificate_bytes)?;
    if delegate_certificate.amount() != signed.delegate_info.amount {
        return Err(Error::MalformedInput(format!(
            "signer reported amount {} but the delegate certificate is for {}",
            signed.delegate_info.amount,
            delegate_certificate.amount()
        )));
    }

    let signature = unblind(&blind_sig, ctx)?;
    let certificate = assemble(&donor_public_key, &signature.to_bytes(), delegate_certificate)?;
    let info = verify(&certificate, master_public_key)?;

    tracing::info!(amount = info.amount, "issued donation certificate");
    Ok(IssuedCertificate {
        certificate,
        donor_key,
        info,
    })
}
