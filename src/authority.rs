//! An in-process signing service.
//!
//! Holds one delegate key per amount and remembers which payment references
//! have been signed, so each authorized payment yields at most one blind
//! signature. State lives in memory only; a deployment that needs durability
//! implements [`SigningAuthority`] over its own storage.
//!
//! The ledger lock is held only to claim and settle a reference, not while
//! signing, so requests for different payments do not wait on each other.
//! Signed references are never evicted: forgetting one would let its payment
//! be signed again, so the ledger grows with the number of payments served.

use crate::blind_sigs::sign_blinded;
use crate::delegate::DelegateCertificate;
use crate::error::{Error, Result};
use crate::issuance::{
    DelegateInfo, SignedResponse, SigningAuthority, SigningErrorKind, SigningFailure,
    SigningRequest, SigningResponse,
};
use crate::keys::KeyPair;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PaymentState {
    Authorized { amount: u64 },
    /// Claimed by a request that is signing right now.
    Signing { amount: u64 },
    Signed,
}

enum Claim {
    Granted(u64),
    Refused(SigningFailure),
}

struct Tier {
    key: KeyPair,
    certificate: String,
}

#[derive(Default)]
pub struct SigningService {
    tiers: BTreeMap<u64, Tier>,
    payments: Mutex<HashMap<String, PaymentState>>,
}

impl SigningService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the delegate key used for `certificate.metadata.amount`,
    /// replacing any earlier key for that amount.
    pub fn add_tier(&mut self, key: KeyPair, certificate: &DelegateCertificate) -> Result<()> {
        if certificate.delegate_public_key != key.public_key_bytes().to_vec() {
            return Err(Error::MalformedInput(
                "delegate key does not match its certificate".into(),
            ));
        }
        let tier = Tier {
            key,
            certificate: BASE64_STANDARD.encode(certificate.to_bytes()?),
        };
        self.tiers.insert(certificate.amount(), tier);
        Ok(())
    }

    pub fn amounts(&self) -> impl Iterator<Item = u64> + '_ {
        self.tiers.keys().copied()
    }

    /// Records a captured payment. Capturing itself happens elsewhere.
    pub fn authorize_payment(&self, payment_reference: &str, amount: u64) -> Result<()> {
        if !self.tiers.contains_key(&amount) {
            return Err(Error::InvalidAmount(amount));
        }
        let mut payments = self.lock()?;
        match payments.get(payment_reference) {
            Some(PaymentState::Signed) => {
                return Err(Error::PaymentAlreadySigned(payment_reference.to_string()))
            }
            Some(PaymentState::Signing { .. }) => {
                return Err(Error::SignerUnavailable(format!(
                    "payment {} is being signed",
                    payment_reference
                )))
            }
            _ => {}
        }
        payments.insert(
            payment_reference.to_string(),
            PaymentState::Authorized { amount },
        );
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, PaymentState>>> {
        self.payments
            .lock()
            .map_err(|_| Error::SignerUnavailable("payment ledger poisoned".into()))
    }

    /// Moves an authorized reference to `Signing`, or explains why not.
    fn claim(&self, reference: &str) -> Result<Claim> {
        let mut payments = self.lock()?;
        let amount = match payments.get(reference) {
            None => {
                return Ok(Claim::Refused(SigningFailure::new(
                    SigningErrorKind::PaymentNotFound,
                    "unknown payment reference",
                )))
            }
            Some(PaymentState::Signed) => {
                tracing::warn!(payment_reference = reference, "payment already signed");
                return Ok(Claim::Refused(SigningFailure::new(
                    SigningErrorKind::AlreadySigned,
                    "certificate already signed for this payment",
                )));
            }
            Some(PaymentState::Signing { .. }) => {
                tracing::warn!(payment_reference = reference, "payment is being signed");
                return Ok(Claim::Refused(SigningFailure::new(
                    SigningErrorKind::Unavailable,
                    "a signature for this payment is in progress",
                )));
            }
            Some(PaymentState::Authorized { amount }) => *amount,
        };
        payments.insert(reference.to_string(), PaymentState::Signing { amount });
        Ok(Claim::Granted(amount))
    }

    fn settle(&self, reference: &str, state: PaymentState) -> Result<()> {
        self.lock()?.insert(reference.to_string(), state);
        Ok(())
    }

    fn sign_for(&self, amount: u64, blinded_public_key: &str) -> Result<SigningResponse> {
        let tier = match self.tiers.get(&amount) {
            Some(tier) => tier,
            None => {
                return Ok(SigningResponse::Failed(SigningFailure::new(
                    SigningErrorKind::Unavailable,
                    format!("no delegate key for amount {}", amount),
                )))
            }
        };

        let blinded = match BASE64_STANDARD.decode(blinded_public_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(SigningResponse::Failed(SigningFailure::new(
                    SigningErrorKind::InvalidRequest,
                    e.to_string(),
                )))
            }
        };
        let blind_sig = match sign_blinded(&blinded, tier.key.secret_key()) {
            Ok(sig) => sig,
            Err(Error::InvalidBlindedInput(m)) => {
                return Ok(SigningResponse::Failed(SigningFailure::new(
                    SigningErrorKind::InvalidRequest,
                    m,
                )))
            }
            Err(e) => return Err(e),
        };

        Ok(SigningResponse::Signed(SignedResponse {
            blind_signature: BASE64_STANDARD.encode(blind_sig.to_bytes()),
            delegate_info: DelegateInfo {
                certificate: tier.certificate.clone(),
                amount,
            },
        }))
    }

    fn handle(&self, request: &SigningRequest) -> Result<SigningResponse> {
        let reference = request.payment_reference.as_str();
        let amount = match self.claim(reference)? {
            Claim::Granted(amount) => amount,
            Claim::Refused(failure) => return Ok(SigningResponse::Failed(failure)),
        };

        let response = self.sign_for(amount, &request.blinded_public_key);
        let signed = matches!(response, Ok(SigningResponse::Signed(_)));
        let next = if signed {
            PaymentState::Signed
        } else {
            PaymentState::Authorized { amount }
        };
        self.settle(reference, next)?;
        if signed {
            tracing::info!(payment_reference = reference, amount, "signed blinded donor key");
        }
        response
    }
}

impl SigningAuthority for SigningService {
    fn sign(&self, request: &SigningRequest) -> Result<SigningResponse> {
        self.handle(request)
    }
}
