//! SHAKE-128 PRF expansion.
//!
//! Chain starting points and signing randomness both come from SHAKE-128 over
//! the secret PRF key, with a trailing label byte separating the two streams.
//! Field elements are rejection-sampled from 32-bit little-endian chunks of
//! the XOF output.

use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake128;

use crate::field::{sample_fe, Domain, Randomness, DOMAIN_LEN, MAX_RAND_LEN, F};
use crate::MESSAGE_LENGTH;
use p3_field::PrimeCharacteristicRing;

/// Label byte for chain-start domain elements.
const PRF_LABEL_CHAIN: u8 = 0x00;
/// Label byte for signing randomness.
const PRF_LABEL_RANDOMNESS: u8 = 0x01;

fn sample_elements(reader: &mut impl XofReader, out: &mut [F]) {
    for slot in out {
        *slot = sample_fe(|| {
            let mut chunk = [0u8; 4];
            reader.read(&mut chunk);
            u32::from_le_bytes(chunk)
        });
    }
}

/// Chain starting point for `(epoch, chain index)`.
///
/// The first `hash_len_fe` slots are sampled; the rest stay zero.
pub fn prf_domain(prf_key: &[u8; 32], epoch: u32, index: u64, hash_len_fe: usize) -> Domain {
    let mut hasher = Shake128::default();
    hasher.update(prf_key);
    hasher.update(&epoch.to_le_bytes());
    hasher.update(&index.to_le_bytes());
    hasher.update(&[PRF_LABEL_CHAIN]);
    let mut reader = hasher.finalize_xof();

    let mut out = [F::ZERO; DOMAIN_LEN];
    sample_elements(&mut reader, &mut out[..hash_len_fe]);
    out
}

/// Signing randomness for one encoding attempt.
pub fn prf_randomness(
    prf_key: &[u8; 32],
    epoch: u32,
    message: &[u8; MESSAGE_LENGTH],
    counter: u64,
    rand_len_fe: usize,
) -> Randomness {
    let mut hasher = Shake128::default();
    hasher.update(prf_key);
    hasher.update(&epoch.to_le_bytes());
    hasher.update(message);
    hasher.update(&counter.to_le_bytes());
    hasher.update(&[PRF_LABEL_RANDOMNESS]);
    let mut reader = hasher.finalize_xof();

    let mut out = [F::ZERO; MAX_RAND_LEN];
    sample_elements(&mut reader, &mut out[..rand_len_fe]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::to_canonical;
    use crate::KOALABEAR_PRIME;

    #[test]
    fn test_domain_deterministic_and_separated() {
        let key = [0x42u8; 32];
        let a = prf_domain(&key, 3, 7, 8);
        let b = prf_domain(&key, 3, 7, 8);
        assert_eq!(a, b);
        assert_ne!(a, prf_domain(&key, 3, 8, 8));
        assert_ne!(a, prf_domain(&key, 4, 7, 8));
        assert_ne!(a, prf_domain(&[0x43u8; 32], 3, 7, 8));
    }

    #[test]
    fn test_domain_tail_zero() {
        let out = prf_domain(&[1u8; 32], 0, 0, 7);
        assert_eq!(to_canonical(out[7]), 0);
        for &x in &out[..7] {
            assert!(to_canonical(x) < KOALABEAR_PRIME);
        }
    }

    #[test]
    fn test_randomness_varies_with_counter() {
        let key = [9u8; 32];
        let message = [0x55u8; 32];
        let a = prf_randomness(&key, 0, &message, 0, 7);
        let b = prf_randomness(&key, 0, &message, 1, 7);
        assert_ne!(a, b);
    }

    #[test]
    fn test_streams_do_not_collide() {
        // Same key/epoch but different labels must diverge even when the
        // remaining input bytes happen to line up.
        let key = [7u8; 32];
        let domain = prf_domain(&key, 1, 0, 7);
        let rho = prf_randomness(&key, 1, &[0u8; 32], 0, 7);
        assert_ne!(&domain[..7], &rho[..7]);
    }
}
