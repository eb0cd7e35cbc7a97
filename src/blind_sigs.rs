//! Blind BLS signatures (Boldyreva).
//!
//! The client maps its message onto G2 and multiplies it by a random scalar
//! `r`. The signer multiplies whatever point it receives by its secret key.
//! The client multiplies the result by `1/r` and is left with an ordinary BLS
//! signature on the original message:
//!
//! ```text
//! blinded   = r * H(m)
//! blind_sig = sk * blinded     = r * sk * H(m)
//! sig       = blind_sig / r    = sk * H(m)
//! ```
//!
//! `r * H(m)` is uniformly distributed over G2 whatever `m` is, so the signer
//! learns nothing about `m` and cannot later match a presented signature to
//! the request that produced it. Forging signatures without the key is as
//! hard as one-more CDH in the random oracle model.

use crate::error::{Error, Result};
use crate::keys::random_secret_key;
use crate::utils::*;
use blsttc::pairing::bls12_381::{Fr, G2};
use blsttc::{PublicKey, SecretKey, Signature};
use rand::{CryptoRng, RngCore};
use std::convert::TryFrom;
use std::fmt;

/// A message hidden by a blinding factor. This is the only form in which
/// the signer ever sees the message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlindedMessage {
    blinded_msg: G2,
}

impl BlindedMessage {
    pub fn to_bytes(&self) -> [u8; G2_SIZE] {
        g2_to_be_bytes(self.blinded_msg)
    }
}

impl From<G2> for BlindedMessage {
    fn from(blinded_msg: G2) -> Self {
        Self { blinded_msg }
    }
}

impl TryFrom<&[u8]> for BlindedMessage {
    type Error = Error;

    fn try_from(b: &[u8]) -> Result<Self> {
        Ok(Self::from(slice_to_g2(b)?))
    }
}

/// The signer's answer to a [`BlindedMessage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlindSignature {
    sig: G2,
}

impl BlindSignature {
    pub fn to_bytes(&self) -> [u8; G2_SIZE] {
        g2_to_be_bytes(self.sig)
    }
}

impl TryFrom<&[u8]> for BlindSignature {
    type Error = Error;

    fn try_from(b: &[u8]) -> Result<Self> {
        let sig = slice_to_g2(b).map_err(|e| match e {
            Error::InvalidBlindedInput(m) => {
                Error::MalformedInput(format!("blind signature: {}", m))
            }
            other => other,
        })?;
        Ok(Self { sig })
    }
}

/// Client-side secret for one issuance.
///
/// Lives only between [`blind`] and [`unblind`]; unblinding consumes it, so
/// a context can never be reused for a second request.
pub struct BlindingContext {
    blinding_factor: Fr,
    original_value: Vec<u8>,
}

impl BlindingContext {
    pub fn original_value(&self) -> &[u8] {
        &self.original_value
    }
}

impl fmt::Debug for BlindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlindingContext")
            .field("blinding_factor", &"<redacted>")
            .field("original_value_len", &self.original_value.len())
            .finish()
    }
}

/// Blinds `message` with a fresh factor drawn from `rng`.
pub fn blind<R: RngCore + CryptoRng>(
    message: &[u8],
    rng: &mut R,
) -> Result<(BlindedMessage, BlindingContext)> {
    let msg_g2 = hash_g2_with_dst(message)?;

    let r_sk = random_secret_key(rng)?;
    let blinding_factor = fr_from_be_bytes(r_sk.to_bytes())?;

    let blinded = BlindedMessage::from(crate::utils::blind(msg_g2, blinding_factor));
    let ctx = BlindingContext {
        blinding_factor,
        original_value: message.to_vec(),
    };
    Ok((blinded, ctx))
}

/// Signs a blinded message with `signer`.
///
/// The input is only checked for being a valid, non-identity G2 point. It is
/// never interpreted any further, and nothing about it is retained.
pub fn sign_blinded(blinded_message: &[u8], signer: &SecretKey) -> Result<BlindSignature> {
    let blinded = BlindedMessage::try_from(blinded_message)?;
    let sk = fr_from_be_bytes(signer.to_bytes())
        .map_err(|_| Error::SignerUnavailable("signing key is unusable".into()))?;

    // Note we are signing a G2, not message bytes, so we can't
    // use blsttc:SecretKey.sign(msg);
    let sig = sign_g2(blinded.blinded_msg, sk);
    tracing::debug!(input_len = blinded_message.len(), "signed blinded message");

    Ok(BlindSignature { sig })
}

/// Removes the blinding from `blind_signature`, yielding a signature over
/// the original message.
pub fn unblind(blind_signature: &BlindSignature, ctx: BlindingContext) -> Result<Signature> {
    // random_secret_key never yields zero, so the inverse always exists
    let r_inv = fr_inverse(ctx.blinding_factor)
        .ok_or_else(|| Error::MalformedInput("blinding factor has no inverse".into()))?;
    let unblinded_g2 = crate::utils::unblind(blind_signature.sig, r_inv);
    Signature::from_bytes(g2_to_be_bytes(unblinded_g2))
        .map_err(|e| Error::MalformedInput(format!("unblinded signature: {:?}", e)))
}

/// Checks an (unblinded) signature on `message` under `signer`.
pub fn verify(signer: &PublicKey, message: &[u8], sig: &Signature) -> bool {
    verify_signature_on_message(message, sig, signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn official() -> KeyPair {
        KeyPair::generate(&mut StdRng::seed_from_u64(0x0ff1c1a1)).unwrap()
    }

    #[test]
    fn single_signer() -> Result<()> {
        let official = official();
        let mut rng = StdRng::seed_from_u64(7);

        let donor_key = b"a donor public key".to_vec();
        let (blinded, ctx) = blind(&donor_key, &mut rng)?;
        assert_eq!(ctx.original_value(), donor_key.as_slice());

        let blind_sig = sign_blinded(&blinded.to_bytes(), official.secret_key())?;
        let sig = unblind(&blind_sig, ctx)?;

        assert!(verify(&official.public_key(), &donor_key, &sig));
        Ok(())
    }

    #[test]
    fn unblinded_signature_equals_direct_signature() -> Result<()> {
        let official = official();
        let mut rng = StdRng::seed_from_u64(8);
        let msg = b"same message";

        let (blinded, ctx) = blind(msg, &mut rng)?;
        let sig = unblind(&sign_blinded(&blinded.to_bytes(), official.secret_key())?, ctx)?;

        let sk = fr_from_be_bytes(official.secret_key().to_bytes())?;
        let direct = g2_to_be_bytes(sign_g2(hash_g2_with_dst(msg)?, sk));
        assert_eq!(sig.to_bytes(), direct);
        Ok(())
    }

    #[test]
    fn signature_does_not_verify_for_other_message_or_key() -> Result<()> {
        let official = official();
        let other = KeyPair::generate(&mut StdRng::seed_from_u64(9))?;
        let mut rng = StdRng::seed_from_u64(10);

        let (blinded, ctx) = blind(b"message", &mut rng)?;
        let sig = unblind(&sign_blinded(&blinded.to_bytes(), official.secret_key())?, ctx)?;

        assert!(!verify(&official.public_key(), b"messagf", &sig));
        assert!(!verify(&other.public_key(), b"message", &sig));
        Ok(())
    }

    #[test]
    fn blind_signature_itself_does_not_verify_on_message() -> Result<()> {
        let official = official();
        let mut rng = StdRng::seed_from_u64(11);

        let (blinded, _ctx) = blind(b"message", &mut rng)?;
        let blind_sig = sign_blinded(&blinded.to_bytes(), official.secret_key())?;
        let as_sig = Signature::from_bytes(blind_sig.to_bytes())
            .map_err(|e| Error::MalformedInput(format!("{:?}", e)))?;

        assert!(!verify(&official.public_key(), b"message", &as_sig));
        Ok(())
    }

    #[test]
    fn signer_never_sees_the_hashed_message() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(12);
        let msg = b"donor public key bytes";
        let hashed = g2_to_be_bytes(hash_g2_with_dst(msg)?);

        let (first, _) = blind(msg, &mut rng)?;
        let (second, _) = blind(msg, &mut rng)?;

        assert_ne!(first.to_bytes(), hashed);
        assert_ne!(second.to_bytes(), hashed);
        assert_ne!(first.to_bytes(), second.to_bytes());
        Ok(())
    }

    #[test]
    fn blinded_outputs_look_uniform() -> Result<()> {
        // Repeated blindings of one message: every bit position should be set
        // in roughly half the samples. The top three bits of each 48 byte Fp
        // half are fixed: flags in the first half, and zero in the second
        // because the modulus is below 2^381.
        const SAMPLES: usize = 64;
        const FP_SIZE: usize = G2_SIZE / 2;
        let mut rng = StdRng::seed_from_u64(13);
        let mut ones = [0usize; G2_SIZE * 8];
        let mut seen = std::collections::HashSet::new();

        for _ in 0..SAMPLES {
            let (blinded, _) = blind(b"one message", &mut rng)?;
            let bytes = blinded.to_bytes();
            assert!(seen.insert(bytes.to_vec()));
            for (i, byte) in bytes.iter().enumerate() {
                for bit in 0..8 {
                    if (*byte >> bit) & 1 == 1 {
                        ones[i * 8 + bit] += 1;
                    }
                }
            }
        }

        let fixed = |pos: usize| pos % (FP_SIZE * 8) < 8 && pos % 8 >= 5;
        for (pos, count) in ones.iter().enumerate().filter(|(pos, _)| !fixed(*pos)) {
            assert!(
                (8..=56).contains(count),
                "bit {} set in {} of {} samples",
                pos,
                count,
                SAMPLES
            );
        }
        Ok(())
    }

    #[test]
    fn sign_blinded_rejects_malformed_input() {
        let official = official();
        for bad in [vec![], vec![0u8; 95], vec![0u8; 97], vec![0xffu8; G2_SIZE]].iter() {
            let result = sign_blinded(bad, official.secret_key());
            assert!(matches!(result, Err(Error::InvalidBlindedInput(_))));
        }
    }

    #[test]
    fn malformed_blind_signature_is_rejected_before_unblinding() {
        let result = BlindSignature::try_from(&[0u8; 12][..]);
        assert!(matches!(result, Err(Error::MalformedInput(_))));
    }

    #[test]
    fn concurrent_signing_of_distinct_inputs() -> Result<()> {
        let official = official();
        let mut rng = StdRng::seed_from_u64(14);
        let requests = (0..4u8)
            .map(|i| blind(&[i; 48], &mut rng))
            .collect::<Result<Vec<_>>>()?;

        let blind_sigs: Vec<Result<BlindSignature>> = std::thread::scope(|s| {
            let handles: Vec<_> = requests
                .iter()
                .map(|(blinded, _)| {
                    let sk = official.secret_key();
                    s.spawn(move || sign_blinded(&blinded.to_bytes(), sk))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("signer thread panicked"))
                .collect()
        });

        for (i, ((_, ctx), blind_sig)) in requests.into_iter().zip(blind_sigs).enumerate() {
            let sig = unblind(&blind_sig?, ctx)?;
            assert!(verify(&official.public_key(), &[i as u8; 48], &sig));
        }
        Ok(())
    }

    #[test]
    fn context_debug_hides_factor() -> Result<()> {
        let (_, ctx) = blind(b"m", &mut StdRng::seed_from_u64(15))?;
        assert!(format!("{:?}", ctx).contains("<redacted>"));
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn unblind_of_blind_signature_verifies(
            msg in proptest::collection::vec(any::<u8>(), 0..128),
            seed in any::<u64>(),
        ) {
            let official = official();
            let mut rng = StdRng::seed_from_u64(seed);
            let (blinded, ctx) = blind(&msg, &mut rng).unwrap();
            let blind_sig = sign_blinded(&blinded.to_bytes(), official.secret_key()).unwrap();
            let sig = unblind(&blind_sig, ctx).unwrap();
            prop_assert!(verify(&official.public_key(), &msg, &sig));
        }
    }
}
