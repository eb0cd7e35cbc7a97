use std::path::PathBuf;
use thiserror::Error;

/// Specialisation of `std::Result`.
pub type Result<T, E = GhostkeyError> = std::result::Result<T, E>;
pub type Error = GhostkeyError;

#[derive(Error, Debug)]
/// error variants.
pub enum GhostkeyError {
    #[error("amount must be a positive integer, got {0}")]
    InvalidAmount(u64),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid blinded input: {0}")]
    InvalidBlindedInput(String),

    #[error("signing service unavailable: {0}")]
    SignerUnavailable(String),

    #[error("payment {0} was already used to issue a certificate")]
    PaymentAlreadySigned(String),

    #[error("certificate verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("refusing to overwrite existing file {}", .0.display())]
    OutputExists(PathBuf),

    #[error(
        "{} is accessible by group or others (mode {:o}); restrict it with chmod 600",
        .path.display(),
        .mode
    )]
    InsecurePermissions { path: PathBuf, mode: u32 },

    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("json error")]
    Json(#[from] serde_json::Error),

    #[error("canonical encoding failed")]
    Encoding(#[from] bincode::Error),

    #[error("base64 decoding failed")]
    Base64(#[from] base64::DecodeError),
}

/// Reasons a donor certificate chain is rejected.
///
/// Checks run in a fixed order and the first failure wins, so a certificate
/// with several defects always reports the earliest one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("delegate certificate is not signed by the master key")]
    DelegateChainInvalid,

    #[error("delegate metadata is invalid: {0}")]
    MetadataInvalid(String),

    #[error("donor signature does not verify under the delegate key")]
    DonorSignatureInvalid,

    #[error("message signature does not verify under the donor key")]
    MessageSignatureInvalid,
}

impl GhostkeyError {
    /// Only a transient signer failure is worth retrying, and the retry must
    /// start a fresh blinding transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SignerUnavailable(_))
    }

    /// Text suitable for showing to a donor.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::SignerUnavailable(_) => {
                "The signing service is temporarily unavailable. Please try again."
            }
            Self::PaymentAlreadySigned(_) => {
                "A certificate has already been issued for this payment. It cannot be issued twice."
            }
            Self::Verification(_) => {
                "The issued certificate failed verification and will not be shown."
            }
            Self::MalformedInput(_) => "The certificate data is malformed or incomplete.",
            Self::InvalidBlindedInput(_) => "The signing request was rejected as malformed.",
            _ => "Certificate issuance failed.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_signer_unavailable_is_retryable() {
        assert!(GhostkeyError::SignerUnavailable("timeout".into()).is_retryable());
        assert!(!GhostkeyError::PaymentAlreadySigned("pi_1".into()).is_retryable());
        assert!(!GhostkeyError::from(VerificationError::DonorSignatureInvalid).is_retryable());
        assert!(!GhostkeyError::MalformedInput("x".into()).is_retryable());
        assert!(!GhostkeyError::InsecurePermissions {
            path: "k.pem".into(),
            mode: 0o644
        }
        .is_retryable());
    }

    #[test]
    fn already_signed_has_distinct_message() {
        let already = GhostkeyError::PaymentAlreadySigned("pi_1".into()).user_message();
        let transient = GhostkeyError::SignerUnavailable("down".into()).user_message();
        assert_ne!(already, transient);
        assert!(!already.contains("try again"));
    }

    #[test]
    fn insecure_permissions_names_file_and_mode() {
        let err = GhostkeyError::InsecurePermissions {
            path: "keys/master_private_key.pem".into(),
            mode: 0o644,
        };
        let text = err.to_string();
        assert!(text.contains("keys/master_private_key.pem"));
        assert!(text.contains("644"));
    }
}
