use crate::error::{Error, Result};
use bincode::{DefaultOptions, Options};
use blst::{blst_hash_to_g2, blst_p2, blst_p2_compress};
use blsttc::ff::{Field, PrimeField}; // for Fr trait
use blsttc::group::{CurveAffine, CurveProjective, EncodedPoint};
use blsttc::pairing::bls12_381::{Fr, FrRepr, G2Affine, G2};
use blsttc::{PublicKey, Signature};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Domain separation tag for hashing donor keys onto G2.
pub(crate) const GHOSTKEY_DST: &[u8] = b"FREENET_GHOSTKEY_BLS12381G2_XMD:SHA-256_SSWU_RO_";

/// Compressed G2 point size: blinded messages and signatures.
pub const G2_SIZE: usize = 96;

// Generous upper bound for any artifact this crate decodes.
const MAX_ENCODED_LEN: u64 = 16 * 1024;

pub(crate) fn verify_signature_on_message(msg: &[u8], sig: &Signature, pk: &PublicKey) -> bool {
    // Arbitrary bytes are first mapped onto G2, then the usual pairing check
    // pair(pk_as_g1, msg_as_g2) == pair(1_as_g1, sig_as_g2) applies.
    match hash_g2_with_dst(msg) {
        Ok(msg_g2) => pk.verify_g2(sig, msg_g2),
        Err(_) => false,
    }
}

// blst equivalent of threshold_crypto hash_g2, with our own DST
pub(crate) fn hash_g2_with_dst(msg: &[u8]) -> Result<G2> {
    let mut msg_hash: blst_p2 = Default::default();
    let aug = b"";
    unsafe {
        blst_hash_to_g2(
            &mut msg_hash,
            msg.as_ptr(),
            msg.len(),
            GHOSTKEY_DST.as_ptr(),
            GHOSTKEY_DST.len(),
            aug.as_ptr(),
            aug.len(),
        )
    };
    let mut msg_g2_bytes = [0u8; G2_SIZE];
    unsafe { blst_p2_compress(&mut msg_g2_bytes[0], &msg_hash) }
    be_bytes_to_g2(msg_g2_bytes)
}

// see blsttc util.rs
pub(crate) fn fr_from_be_bytes(bytes: [u8; 32]) -> Result<Fr> {
    let mut le_bytes = bytes;
    le_bytes.reverse();
    let mut fr_u64s = [0u64; 4];
    for (limb, chunk) in fr_u64s.iter_mut().zip(le_bytes.chunks_exact(8)) {
        let mut next_u64_bytes = [0u8; 8];
        next_u64_bytes.copy_from_slice(chunk);
        *limb = u64::from_le_bytes(next_u64_bytes);
    }
    Fr::from_repr(FrRepr(fr_u64s))
        .map_err(|_| Error::MalformedInput("scalar is not below the group order".into()))
}

pub(crate) fn fr_inverse(r: Fr) -> Option<Fr> {
    r.inverse()
}

// y = x * r
pub(crate) fn blind(g2: G2, r: Fr) -> G2 {
    g2.into_affine().mul(r)
}

// x = y * 1/r, where r_inv was computed when the blinding factor was drawn
pub(crate) fn unblind(g2: G2, r_inv: Fr) -> G2 {
    g2.into_affine().mul(r_inv)
}

// see blsttc Signature from_bytes
pub(crate) fn be_bytes_to_g2(bytes: [u8; G2_SIZE]) -> Result<G2> {
    let mut compressed: <G2Affine as CurveAffine>::Compressed = EncodedPoint::empty();
    compressed.as_mut().copy_from_slice(&bytes);
    let affine = compressed
        .into_affine()
        .map_err(|e| Error::InvalidBlindedInput(format!("not a G2 point: {:?}", e)))?;
    if affine.is_zero() {
        return Err(Error::InvalidBlindedInput("identity point".into()));
    }
    Ok(affine.into_projective())
}

pub(crate) fn slice_to_g2(bytes: &[u8]) -> Result<G2> {
    if bytes.len() != G2_SIZE {
        return Err(Error::InvalidBlindedInput(format!(
            "expected {} bytes, got {}",
            G2_SIZE,
            bytes.len()
        )));
    }
    let mut buf = [0u8; G2_SIZE];
    buf.copy_from_slice(bytes);
    be_bytes_to_g2(buf)
}

// see blsttc Signature to_bytes
pub(crate) fn g2_to_be_bytes(g2: G2) -> [u8; G2_SIZE] {
    let mut bytes = [0u8; G2_SIZE];
    bytes.copy_from_slice(g2.into_affine().into_compressed().as_ref());
    bytes
}

// Equivalent to blsttc SecretKey::sign_g2, kept at the Fr/G2 level so the
// blinding factor and the signing key go through the same arithmetic.
pub(crate) fn sign_g2(g2: G2, fr: Fr) -> G2 {
    g2.into_affine().mul(fr)
}

fn canonical_options() -> impl Options {
    DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_ENCODED_LEN)
        .reject_trailing_bytes()
}

/// Fixed field order, fixed-width little-endian integers, length-prefixed
/// byte strings. Signatures are computed over exactly these bytes.
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(canonical_options().serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    canonical_options()
        .deserialize(bytes)
        .map_err(|e| Error::MalformedInput(format!("cannot decode {}: {}", what, e)))
}
