//! Poseidon2 permutations and the compression / sponge modes built on them.
//!
//! Both widths use the published Plonky3 KoalaBear instances (round schedule,
//! round constants and MDS matrices come with `default_koalabear_poseidon2_*`).
//! The packed variants process one independent input per SIMD lane and agree
//! element-for-element with the scalar functions.

use std::sync::LazyLock;

use p3_field::{Field, PackedValue, PrimeCharacteristicRing};
use p3_koala_bear::{
    default_koalabear_poseidon2_16, default_koalabear_poseidon2_24, Poseidon2KoalaBear,
};
use p3_symmetric::Permutation;

use crate::field::F;

/// Permutation width for single-message compression.
pub const WIDTH_16: usize = 16;
/// Permutation width for pair compression and the sponge.
pub const WIDTH_24: usize = 24;
/// Sponge rate.
pub const RATE: usize = 15;
/// Sponge capacity.
pub const CAPACITY: usize = 9;

/// SIMD-packed field element; one slot carries [`LANES`] independent values.
pub type PackedF = <F as Field>::Packing;
/// Number of lanes the target packs per slot (1 without vector support).
pub const LANES: usize = PackedF::WIDTH;

static POSEIDON2_16: LazyLock<Poseidon2KoalaBear<16>> =
    LazyLock::new(default_koalabear_poseidon2_16);
static POSEIDON2_24: LazyLock<Poseidon2KoalaBear<24>> =
    LazyLock::new(default_koalabear_poseidon2_24);

/// Width-16 permutation in place.
#[inline]
pub fn permute_16(state: &mut [F; WIDTH_16]) {
    POSEIDON2_16.permute_mut(state);
}

/// Width-24 permutation in place.
#[inline]
pub fn permute_24(state: &mut [F; WIDTH_24]) {
    POSEIDON2_24.permute_mut(state);
}

/// Width-16 compression: zero-pad, permute, feed-forward, truncate to OUT.
pub fn poseidon_compress_16<const OUT: usize>(input: &[F]) -> [F; OUT] {
    debug_assert!(input.len() <= WIDTH_16 && OUT <= WIDTH_16);
    let mut padded = [F::ZERO; WIDTH_16];
    padded[..input.len()].copy_from_slice(input);
    let mut state = padded;
    permute_16(&mut state);
    for (slot, original) in state.iter_mut().zip(padded.iter()) {
        *slot += *original;
    }
    let mut out = [F::ZERO; OUT];
    out.copy_from_slice(&state[..OUT]);
    out
}

/// Width-24 compression: zero-pad, permute, feed-forward, truncate to OUT.
pub fn poseidon_compress_24<const OUT: usize>(input: &[F]) -> [F; OUT] {
    debug_assert!(input.len() <= WIDTH_24 && OUT <= WIDTH_24);
    let mut padded = [F::ZERO; WIDTH_24];
    padded[..input.len()].copy_from_slice(input);
    let mut state = padded;
    permute_24(&mut state);
    for (slot, original) in state.iter_mut().zip(padded.iter()) {
        *slot += *original;
    }
    let mut out = [F::ZERO; OUT];
    out.copy_from_slice(&state[..OUT]);
    out
}

/// Width-16 compression over packed lanes; feed-forward included.
pub fn poseidon_compress_16_packed(input: &[PackedF; WIDTH_16]) -> [PackedF; WIDTH_16] {
    let mut state = *input;
    POSEIDON2_16.permute_mut(&mut state);
    for (slot, original) in state.iter_mut().zip(input.iter()) {
        *slot += *original;
    }
    state
}

/// Sponge over width 24 with an explicit capacity value.
///
/// State starts as zeros[RATE] || capacity_value; each rate-sized chunk is
/// added into the rate part and followed by a permutation (the final partial
/// chunk is implicitly zero-padded). Squeezing reads RATE elements per
/// permutation until `out_len` elements are collected.
pub fn poseidon_sponge(input: &[F], capacity_value: &[F; CAPACITY], out_len: usize) -> Vec<F> {
    let mut state = [F::ZERO; WIDTH_24];
    state[RATE..].copy_from_slice(capacity_value);

    for chunk in input.chunks(RATE) {
        for (slot, x) in state.iter_mut().zip(chunk.iter()) {
            *slot += *x;
        }
        permute_24(&mut state);
    }

    let mut out = Vec::with_capacity(out_len);
    loop {
        for &x in state.iter().take(RATE) {
            if out.len() == out_len {
                return out;
            }
            out.push(x);
        }
        if out.len() == out_len {
            return out;
        }
        permute_24(&mut state);
    }
}
