mod armor;
mod authority;
mod blind_sigs;
mod certificate;
mod delegate;
mod error;
mod issuance;
mod keys;
pub mod keystore;
mod message;
mod utils;
mod verify;

pub use crate::armor::{
    armor, armor_certificate, dearmor, dearmor_certificate, export_certificate,
    import_certificate, CERTIFICATE_LABEL, PRIVATE_KEY_LABEL,
};
pub use crate::authority::SigningService;
pub use crate::blind_sigs::{
    blind, sign_blinded, unblind, verify as verify_signature, BlindSignature, BlindedMessage,
    BlindingContext,
};
pub use crate::certificate::{assemble, DonorCertificate};
pub use crate::delegate::{
    generate_delegate, generate_delegate_from_metadata, DelegateCertificate, DelegateMetadata,
    DONATION_ACTION,
};
pub use crate::error::{Error, GhostkeyError, Result, VerificationError};
pub use crate::issuance::{
    request_certificate, DelegateInfo, IssuedCertificate, SignedResponse, SigningAuthority,
    SigningErrorKind, SigningFailure, SigningRequest, SigningResponse,
};
pub use crate::keys::{public_key_from_bytes, KeyPair, PK_SIZE, SK_SIZE};
pub use crate::message::{sign_message, verify_message, MessageSignature, SIGNATURE_LABEL};
pub use crate::utils::G2_SIZE;
pub use crate::verify::{verify, VerifiedInfo};

pub use blsttc::{PublicKey, SecretKey, Signature};
