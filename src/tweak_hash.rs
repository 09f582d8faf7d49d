//! Tweakable Poseidon2 hashing.
//!
//! Every hash invocation mixes in a tweak binding it to a role (chain step,
//! tree node, message hash), a position and an epoch. Tweaks are 128-bit
//! integers decomposed into two little-endian base-p digits.

use p3_field::PrimeCharacteristicRing;

use crate::field::{Domain, Parameter, DOMAIN_LEN, F, PARAMETER_LEN, TWEAK_LEN};
use crate::params::LifetimeParams;
use crate::poseidon2::{
    poseidon_compress_16, poseidon_compress_16_packed, poseidon_compress_24, poseidon_sponge,
    PackedF, CAPACITY, LANES, WIDTH_16, WIDTH_24,
};
use crate::{
    KOALABEAR_PRIME, TWEAK_SEPARATOR_FOR_CHAIN_HASH, TWEAK_SEPARATOR_FOR_MESSAGE_HASH,
    TWEAK_SEPARATOR_FOR_TREE_HASH,
};
use p3_field::PackedValue;

/// Domain-separating tweak for the three hash roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoseidonTweak {
    /// Chain step: (epoch, chain index, position in chain)
    Chain {
        epoch: u32,
        chain_index: u8,
        pos_in_chain: u8,
    },
    /// Tree node: (tweak level, position in level). The tweak level of an
    /// inner node is one past the level of its children; the leaf reduction
    /// uses level 0.
    Tree { level: u8, pos_in_level: u64 },
    /// Message hash: epoch only.
    Message { epoch: u32 },
}

impl PoseidonTweak {
    /// Two little-endian base-p digits of the 128-bit tweak integer.
    pub fn to_field_elements(&self) -> [F; TWEAK_LEN] {
        let mut acc: u128 = match self {
            PoseidonTweak::Chain {
                epoch,
                chain_index,
                pos_in_chain,
            } => {
                ((*epoch as u128) << 24)
                    | ((*chain_index as u128) << 16)
                    | ((*pos_in_chain as u128) << 8)
                    | (TWEAK_SEPARATOR_FOR_CHAIN_HASH as u128)
            }
            PoseidonTweak::Tree {
                level,
                pos_in_level,
            } => {
                ((*level as u128) << 40)
                    | ((*pos_in_level as u128) << 8)
                    | (TWEAK_SEPARATOR_FOR_TREE_HASH as u128)
            }
            PoseidonTweak::Message { epoch } => {
                ((*epoch as u128) << 8) | (TWEAK_SEPARATOR_FOR_MESSAGE_HASH as u128)
            }
        };

        let mut out = [F::ZERO; TWEAK_LEN];
        for digit in &mut out {
            *digit = F::from_u32((acc % KOALABEAR_PRIME as u128) as u32);
            acc /= KOALABEAR_PRIME as u128;
        }
        out
    }
}

/// One chain step: width-16 compression of parameter || tweak || state.
///
/// Only the first `hash_len_fe` state slots are fed in; the output is
/// zero-extended back to the domain width.
pub fn chain_hash(
    state: &Domain,
    epoch: u32,
    chain_index: u8,
    pos_in_chain: u8,
    parameter: &Parameter,
    params: &LifetimeParams,
) -> Domain {
    let tweak = PoseidonTweak::Chain {
        epoch,
        chain_index,
        pos_in_chain,
    }
    .to_field_elements();

    let mut input = [F::ZERO; WIDTH_16];
    input[..PARAMETER_LEN].copy_from_slice(parameter);
    input[PARAMETER_LEN..PARAMETER_LEN + TWEAK_LEN].copy_from_slice(&tweak);
    let state_at = PARAMETER_LEN + TWEAK_LEN;
    input[state_at..state_at + params.hash_len_fe].copy_from_slice(&state[..params.hash_len_fe]);

    let full = poseidon_compress_16::<DOMAIN_LEN>(&input[..state_at + params.hash_len_fe]);
    let mut out = [F::ZERO; DOMAIN_LEN];
    out[..params.hash_len_fe].copy_from_slice(&full[..params.hash_len_fe]);
    out
}

/// Packed chain step over [`LANES`] epochs in lockstep.
///
/// `epochs` carries one epoch per lane; chain index and position are shared.
/// Lane-for-lane identical to [`chain_hash`].
pub fn chain_hash_packed(
    state: &[PackedF; DOMAIN_LEN],
    epochs: &[u32],
    chain_index: u8,
    pos_in_chain: u8,
    parameter: &Parameter,
    params: &LifetimeParams,
) -> [PackedF; DOMAIN_LEN] {
    debug_assert_eq!(epochs.len(), LANES);
    let tweaks: Vec<[F; TWEAK_LEN]> = epochs
        .iter()
        .map(|&epoch| {
            PoseidonTweak::Chain {
                epoch,
                chain_index,
                pos_in_chain,
            }
            .to_field_elements()
        })
        .collect();

    let mut input = [PackedF::ZERO; WIDTH_16];
    for (slot, &x) in input.iter_mut().zip(parameter.iter()) {
        *slot = PackedF::from_fn(|_| x);
    }
    for t in 0..TWEAK_LEN {
        input[PARAMETER_LEN + t] = PackedF::from_fn(|lane| tweaks[lane][t]);
    }
    let state_at = PARAMETER_LEN + TWEAK_LEN;
    input[state_at..state_at + params.hash_len_fe]
        .copy_from_slice(&state[..params.hash_len_fe]);

    let full = poseidon_compress_16_packed(&input);
    let mut out = [PackedF::ZERO; DOMAIN_LEN];
    out[..params.hash_len_fe].copy_from_slice(&full[..params.hash_len_fe]);
    out
}

/// Merkle node hash: width-24 compression of parameter || tweak || left || right.
///
/// `level` is the level of the children; the tweak carries `level + 1`.
pub fn tree_hash(
    left: &Domain,
    right: &Domain,
    level: u8,
    pos_in_level: u64,
    parameter: &Parameter,
    params: &LifetimeParams,
) -> Domain {
    let tweak = PoseidonTweak::Tree {
        level: level + 1,
        pos_in_level,
    }
    .to_field_elements();

    let hash_len = params.hash_len_fe;
    let mut input = [F::ZERO; WIDTH_24];
    input[..PARAMETER_LEN].copy_from_slice(parameter);
    input[PARAMETER_LEN..PARAMETER_LEN + TWEAK_LEN].copy_from_slice(&tweak);
    let left_at = PARAMETER_LEN + TWEAK_LEN;
    input[left_at..left_at + hash_len].copy_from_slice(&left[..hash_len]);
    input[left_at + hash_len..left_at + 2 * hash_len].copy_from_slice(&right[..hash_len]);

    let full = poseidon_compress_24::<DOMAIN_LEN>(&input[..left_at + 2 * hash_len]);
    let mut out = [F::ZERO; DOMAIN_LEN];
    out[..hash_len].copy_from_slice(&full[..hash_len]);
    out
}

/// Reduce the chain ends of one epoch to its leaf domain element.
///
/// The sponge capacity is bound to the shape of the input through a
/// compressed domain separator, and the tweak uses raw level 0.
pub fn leaf_reduce(
    chain_ends: &[Domain],
    parameter: &Parameter,
    epoch: u32,
    params: &LifetimeParams,
) -> Domain {
    let hash_len = params.hash_len_fe;
    let tweak = PoseidonTweak::Tree {
        level: 0,
        pos_in_level: epoch as u64,
    }
    .to_field_elements();

    // Shape separator: param_len << 96 | tweak_fe << 64 | dim << 32 | hash_fe,
    // expanded into base-p digits and compressed to the capacity value.
    let mut sep: u128 = ((PARAMETER_LEN as u128) << 96)
        | ((TWEAK_LEN as u128) << 64)
        | ((params.dimension as u128) << 32)
        | (hash_len as u128);
    let mut cap_input = [F::ZERO; WIDTH_24];
    for digit in &mut cap_input {
        *digit = F::from_u32((sep % KOALABEAR_PRIME as u128) as u32);
        sep /= KOALABEAR_PRIME as u128;
    }
    let capacity_value = poseidon_compress_24::<CAPACITY>(&cap_input);

    let mut input = Vec::with_capacity(PARAMETER_LEN + TWEAK_LEN + chain_ends.len() * hash_len);
    input.extend_from_slice(parameter);
    input.extend_from_slice(&tweak);
    for end in chain_ends {
        input.extend_from_slice(&end[..hash_len]);
    }

    let squeezed = poseidon_sponge(&input, &capacity_value, hash_len);
    let mut out = [F::ZERO; DOMAIN_LEN];
    out[..hash_len].copy_from_slice(&squeezed);
    out
}

/// Walk a chain for `steps` applications starting after `start_pos`.
///
/// Step i uses position `start_pos + i + 1`, so a full chain walk from a PRF
/// start covers positions 1 through base - 1.
pub fn chain(
    state: &Domain,
    epoch: u32,
    chain_index: u8,
    start_pos: u8,
    steps: usize,
    parameter: &Parameter,
    params: &LifetimeParams,
) -> Domain {
    let mut current = *state;
    for offset in 0..steps {
        current = chain_hash(
            &current,
            epoch,
            chain_index,
            start_pos + offset as u8 + 1,
            parameter,
            params,
        );
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{from_canonical, random_domain, random_parameter, to_canonical};
    use crate::params::LIFETIME_2_8;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_chain_tweaks_injective() {
        let mut seen = HashSet::new();
        for epoch in [0u32, 1, 255, 70_000] {
            for chain_index in [0u8, 1, 63] {
                for pos in 0u8..8 {
                    let tweak = PoseidonTweak::Chain {
                        epoch,
                        chain_index,
                        pos_in_chain: pos,
                    }
                    .to_field_elements();
                    let key = (to_canonical(tweak[0]), to_canonical(tweak[1]));
                    assert!(seen.insert(key), "tweak collision at {epoch}/{chain_index}/{pos}");
                }
            }
        }
    }

    #[test]
    fn test_roles_are_separated() {
        // A tree tweak and a chain tweak built from the same raw numbers must
        // still differ thanks to the separator byte.
        let tree = PoseidonTweak::Tree {
            level: 0,
            pos_in_level: 0,
        }
        .to_field_elements();
        let chain = PoseidonTweak::Chain {
            epoch: 0,
            chain_index: 0,
            pos_in_chain: 0,
        }
        .to_field_elements();
        let message = PoseidonTweak::Message { epoch: 0 }.to_field_elements();
        assert_ne!(tree, chain);
        assert_ne!(tree, message);
        assert_ne!(chain, message);
    }

    #[test]
    fn test_chain_walk_composes() {
        let params = LIFETIME_2_8;
        let mut rng = StdRng::seed_from_u64(11);
        let parameter = random_parameter(&mut rng);
        let start = random_domain(&mut rng, params.hash_len_fe);

        let full = chain(&start, 5, 2, 0, 7, &parameter, &params);
        let half = chain(&start, 5, 2, 0, 3, &parameter, &params);
        let rest = chain(&half, 5, 2, 3, 4, &parameter, &params);
        assert_eq!(full, rest);
    }

    #[test]
    fn test_chain_hash_zero_extends() {
        let params = crate::params::LIFETIME_2_18;
        let mut rng = StdRng::seed_from_u64(3);
        let parameter = random_parameter(&mut rng);
        let state = random_domain(&mut rng, params.hash_len_fe);
        let out = chain_hash(&state, 1, 0, 1, &parameter, &params);
        assert_eq!(out[7], F::ZERO);
    }

    #[test]
    fn test_packed_chain_matches_scalar() {
        let params = LIFETIME_2_8;
        let mut rng = StdRng::seed_from_u64(17);
        let parameter = random_parameter(&mut rng);

        let epochs: Vec<u32> = (0..LANES as u32).collect();
        let starts: Vec<Domain> = epochs
            .iter()
            .map(|_| random_domain(&mut rng, params.hash_len_fe))
            .collect();

        let packed: [PackedF; DOMAIN_LEN] =
            core::array::from_fn(|slot| PackedF::from_fn(|lane| starts[lane][slot]));
        let stepped = chain_hash_packed(&packed, &epochs, 4, 2, &parameter, &params);

        for (lane, (&epoch, start)) in epochs.iter().zip(starts.iter()).enumerate() {
            let scalar = chain_hash(start, epoch, 4, 2, &parameter, &params);
            for slot in 0..DOMAIN_LEN {
                assert_eq!(stepped[slot].as_slice()[lane], scalar[slot]);
            }
        }
    }

    #[test]
    fn test_leaf_reduce_depends_on_epoch() {
        let params = LIFETIME_2_8;
        let mut rng = StdRng::seed_from_u64(23);
        let parameter = random_parameter(&mut rng);
        let ends: Vec<Domain> = (0..params.dimension)
            .map(|_| random_domain(&mut rng, params.hash_len_fe))
            .collect();

        let a = leaf_reduce(&ends, &parameter, 0, &params);
        let b = leaf_reduce(&ends, &parameter, 1, &params);
        assert_ne!(a, b);
        assert_eq!(a, leaf_reduce(&ends, &parameter, 0, &params));
    }

    #[test]
    fn test_tree_hash_depends_on_position() {
        let params = LIFETIME_2_8;
        let left = [from_canonical(1); DOMAIN_LEN];
        let right = [from_canonical(2); DOMAIN_LEN];
        let parameter = [from_canonical(3); PARAMETER_LEN];
        let a = tree_hash(&left, &right, 0, 0, &parameter, &params);
        let b = tree_hash(&left, &right, 0, 1, &parameter, &params);
        let c = tree_hash(&left, &right, 1, 0, &parameter, &params);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
