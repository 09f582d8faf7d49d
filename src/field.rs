//! KoalaBear field plumbing.
//!
//! Storage everywhere is the Montgomery form provided by [`p3_koala_bear`];
//! serialization and logging use the canonical form; conversions happen
//! exactly once at those boundaries.

use p3_field::{PrimeCharacteristicRing, PrimeField32};
use p3_koala_bear::KoalaBear;
use rand::RngCore;

use crate::KOALABEAR_PRIME;

/// Field type used throughout.
pub type F = KoalaBear;

/// Width of a domain element (hash-chain state / tree node). Profiles with a
/// 7-element hash output keep the trailing slot at zero.
pub const DOMAIN_LEN: usize = 8;
/// Public parameter length in field elements.
pub const PARAMETER_LEN: usize = 5;
/// Maximum signing-randomness length; rho is padded to this width.
pub const MAX_RAND_LEN: usize = 7;
/// Tweak length in field elements.
pub const TWEAK_LEN: usize = 2;
/// Message encoding length in field elements.
pub const MSG_LEN_FE: usize = 9;

/// Hash-chain state and Merkle node value.
pub type Domain = [F; DOMAIN_LEN];
/// Public parameter.
pub type Parameter = [F; PARAMETER_LEN];
/// Signing randomness (rho), fixed width.
pub type Randomness = [F; MAX_RAND_LEN];

const MONTY_BITS: u32 = 32;
const MONTY_MU: u32 = 0x8100_0001;

/// Words at or above this value are rejected when sampling; 2p is the largest
/// multiple of p below 2^32.
const REJECTION_BOUND: u32 = 2 * KOALABEAR_PRIME;

/// Canonical value from a u32 (reduced mod p).
#[inline]
pub fn from_canonical(value: u32) -> F {
    F::from_u32(value)
}

/// Canonical representative of a field element.
#[inline]
pub fn to_canonical(x: F) -> u32 {
    x.as_canonical_u32()
}

/// Montgomery residue of a canonical value: x * 2^32 mod p.
#[inline]
pub fn to_monty(canonical: u32) -> u32 {
    (((canonical as u64) << MONTY_BITS) % KOALABEAR_PRIME as u64) as u32
}

/// Montgomery reduction: x * 2^-32 mod p for x < 2^32 * p.
#[inline]
pub fn monty_reduce(x: u64) -> u32 {
    let t = x.wrapping_mul(MONTY_MU as u64) & 0xffff_ffff;
    let u = t.wrapping_mul(KOALABEAR_PRIME as u64);
    let (x_sub_u, borrow) = x.overflowing_sub(u);
    let x_sub_u_hi = (x_sub_u >> MONTY_BITS) as u32;
    let corr = if borrow { KOALABEAR_PRIME } else { 0 };
    x_sub_u_hi.wrapping_add(corr)
}

/// Serialize as the 4 little-endian bytes of the Montgomery representation.
#[inline]
pub fn fe_to_le_bytes(x: F) -> [u8; 4] {
    to_monty(x.as_canonical_u32()).to_le_bytes()
}

/// Inverse of [`fe_to_le_bytes`]. Rejects words outside the field.
#[inline]
pub fn fe_from_le_bytes(bytes: [u8; 4]) -> Option<F> {
    let monty = u32::from_le_bytes(bytes);
    if monty >= KOALABEAR_PRIME {
        return None;
    }
    Some(F::from_u32(monty_reduce(monty as u64)))
}

/// Rejection-sample one field element from a stream of 32-bit words.
#[inline]
pub fn sample_fe(mut next_word: impl FnMut() -> u32) -> F {
    loop {
        let word = next_word();
        if word < REJECTION_BOUND {
            return F::from_u32(word % KOALABEAR_PRIME);
        }
    }
}

/// Uniform field element from an RNG.
pub fn random_fe<R: RngCore>(rng: &mut R) -> F {
    sample_fe(|| rng.next_u32())
}

/// Uniform public parameter.
pub fn random_parameter<R: RngCore>(rng: &mut R) -> Parameter {
    let mut out = [F::ZERO; PARAMETER_LEN];
    for slot in &mut out {
        *slot = random_fe(rng);
    }
    out
}

/// Uniform domain element with `hash_len_fe` live slots.
pub fn random_domain<R: RngCore>(rng: &mut R, hash_len_fe: usize) -> Domain {
    let mut out = [F::ZERO; DOMAIN_LEN];
    for slot in out.iter_mut().take(hash_len_fe) {
        *slot = random_fe(rng);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_monty_round_trip() {
        for canonical in [0u32, 1, 2, 12345, KOALABEAR_PRIME - 1] {
            let monty = to_monty(canonical);
            assert!(monty < KOALABEAR_PRIME);
            assert_eq!(monty_reduce(monty as u64), canonical);
        }
    }

    #[test]
    fn test_byte_codec_round_trip() {
        let x = from_canonical(0x1234_5678 % KOALABEAR_PRIME);
        let bytes = fe_to_le_bytes(x);
        assert_eq!(fe_from_le_bytes(bytes), Some(x));
    }

    #[test]
    fn test_byte_codec_rejects_out_of_range() {
        assert_eq!(fe_from_le_bytes(KOALABEAR_PRIME.to_le_bytes()), None);
        assert_eq!(fe_from_le_bytes(u32::MAX.to_le_bytes()), None);
    }

    #[test]
    fn test_zero_has_zero_monty_form() {
        assert_eq!(fe_to_le_bytes(F::ZERO), [0u8; 4]);
    }

    #[test]
    fn test_sampler_rejects_high_words() {
        // Stream: one word above 2p, then an accepted one.
        let mut words = [u32::MAX, 5].into_iter();
        let x = sample_fe(|| words.next().unwrap());
        assert_eq!(to_canonical(x), 5);
    }

    #[test]
    fn test_random_values_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let x = random_fe(&mut rng);
            assert!(to_canonical(x) < KOALABEAR_PRIME);
        }
        let domain = random_domain(&mut rng, 7);
        assert_eq!(domain[7], F::ZERO);
    }
}
