//! Two-level Merkle tree engine.
//!
//! Bottom trees cover one epoch window each and are pure functions of
//! (prf_key, parameter, tree index); their padding randomness comes from a
//! zero-seeded ChaCha12 stream so parallel construction stays deterministic.
//! The top tree is built over the bottom-tree roots and pads from the
//! scheme's main RNG under its mutex. All padded layers are retained for
//! co-path extraction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use p3_field::{PackedValue, PrimeCharacteristicRing};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

use crate::error::SignatureError;
use crate::field::{random_domain, Domain, Parameter, DOMAIN_LEN, F};
use crate::params::LifetimeParams;
use crate::poseidon2::{PackedF, LANES};
use crate::prf::prf_domain;
use crate::tweak_hash::{chain, chain_hash_packed, leaf_reduce, tree_hash};

/// Contiguous run of nodes at one tree level, addressed absolutely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTreeLayer {
    pub start_index: u64,
    pub nodes: Vec<Domain>,
}

/// A subtree together with every layer needed for co-path extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSubTree {
    pub root: Domain,
    pub layers: Vec<HashTreeLayer>,
}

impl HashSubTree {
    /// Epoch range covered by the bottommost layer.
    pub fn leaf_range(&self) -> std::ops::Range<u64> {
        let layer = &self.layers[0];
        layer.start_index..layer.start_index + layer.nodes.len() as u64
    }
}

/// Pad a layer so its start index and length are both even.
///
/// One random node goes in front when the start is odd and one at the back
/// when the last index is even; the front node is drawn first.
pub fn padded(layer: HashTreeLayer, next_pad: &mut dyn FnMut() -> Domain) -> HashTreeLayer {
    let mut start_index = layer.start_index;
    let mut nodes = layer.nodes;
    if start_index & 1 == 1 {
        nodes.insert(0, next_pad());
        start_index -= 1;
    }
    if (start_index + nodes.len() as u64 - 1) & 1 == 0 {
        nodes.push(next_pad());
    }
    HashTreeLayer { start_index, nodes }
}

/// Hash a layer sequence up to its single root node.
///
/// `first_level` is the level of the starting layer; `num_levels` pad/pair
/// rounds are applied. Returns the retained layers (padded layers plus the
/// root layer).
fn build_layers(
    mut current: HashTreeLayer,
    first_level: u8,
    num_levels: u32,
    parameter: &Parameter,
    params: &LifetimeParams,
    next_pad: &mut dyn FnMut() -> Domain,
) -> Result<HashSubTree, SignatureError> {
    if current.nodes.is_empty() {
        return Err(SignatureError::MalformedSubTree);
    }

    let mut layers = Vec::with_capacity(num_levels as usize + 1);
    for level_offset in 0..num_levels {
        let level = first_level + level_offset as u8;
        let layer = padded(current, next_pad);
        let parent_start = layer.start_index >> 1;
        let parents = layer
            .nodes
            .chunks_exact(2)
            .enumerate()
            .map(|(i, pair)| {
                tree_hash(
                    &pair[0],
                    &pair[1],
                    level,
                    parent_start + i as u64,
                    parameter,
                    params,
                )
            })
            .collect();
        layers.push(layer);
        current = HashTreeLayer {
            start_index: parent_start,
            nodes: parents,
        };
    }

    if current.nodes.len() != 1 {
        return Err(SignatureError::MalformedSubTree);
    }
    let root = current.nodes[0];
    layers.push(current);
    Ok(HashSubTree { root, layers })
}

/// Chain ends and leaf for a single epoch (scalar path).
fn compute_leaf(
    params: &LifetimeParams,
    prf_key: &[u8; 32],
    parameter: &Parameter,
    epoch: u32,
) -> Domain {
    let mut ends = Vec::with_capacity(params.dimension);
    for chain_index in 0..params.dimension {
        let start = prf_domain(prf_key, epoch, chain_index as u64, params.hash_len_fe);
        ends.push(chain(
            &start,
            epoch,
            chain_index as u8,
            0,
            params.base - 1,
            parameter,
            params,
        ));
    }
    leaf_reduce(&ends, parameter, epoch, params)
}

/// Leaves for LANES consecutive epochs with the chains walked in SIMD
/// lockstep. Lane-for-lane identical to the scalar path.
fn compute_leaves_packed(
    params: &LifetimeParams,
    prf_key: &[u8; 32],
    parameter: &Parameter,
    first_epoch: u64,
) -> Vec<Domain> {
    let epochs: Vec<u32> = (0..LANES as u64).map(|lane| (first_epoch + lane) as u32).collect();
    let mut ends: Vec<Vec<Domain>> = vec![vec![[F::ZERO; DOMAIN_LEN]; params.dimension]; LANES];

    for chain_index in 0..params.dimension {
        let starts: Vec<Domain> = epochs
            .iter()
            .map(|&epoch| prf_domain(prf_key, epoch, chain_index as u64, params.hash_len_fe))
            .collect();
        let mut packed: [PackedF; DOMAIN_LEN] =
            core::array::from_fn(|slot| PackedF::from_fn(|lane| starts[lane][slot]));

        for pos in 1..params.base {
            packed = chain_hash_packed(
                &packed,
                &epochs,
                chain_index as u8,
                pos as u8,
                parameter,
                params,
            );
        }

        for (lane, lane_ends) in ends.iter_mut().enumerate() {
            for slot in 0..DOMAIN_LEN {
                lane_ends[chain_index][slot] = packed[slot].as_slice()[lane];
            }
        }
    }

    epochs
        .iter()
        .zip(ends.iter())
        .map(|(&epoch, lane_ends)| leaf_reduce(lane_ends, parameter, epoch, params))
        .collect()
}

/// Leaves for a contiguous epoch range: packed in LANES-sized batches, scalar
/// for the tail.
fn compute_leaves_chunk(
    params: &LifetimeParams,
    prf_key: &[u8; 32],
    parameter: &Parameter,
    start_epoch: u64,
    count: u64,
) -> Vec<Domain> {
    let mut out = Vec::with_capacity(count as usize);
    let end = start_epoch + count;
    let mut epoch = start_epoch;
    while epoch + LANES as u64 <= end {
        out.extend(compute_leaves_packed(params, prf_key, parameter, epoch));
        epoch += LANES as u64;
    }
    while epoch < end {
        out.push(compute_leaf(params, prf_key, parameter, epoch as u32));
        epoch += 1;
    }
    out
}

/// Leaves for a contiguous epoch range, optionally spread across worker
/// threads over pre-partitioned chunks. Result is identical either way.
pub fn compute_leaf_range(
    params: &LifetimeParams,
    prf_key: &[u8; 32],
    parameter: &Parameter,
    start_epoch: u64,
    count: u64,
    threaded: bool,
) -> Vec<Domain> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    // Chunks stay multiples of the lane count so only the last one can hit
    // the scalar tail.
    let chunk_len = (count as usize).div_ceil(workers * 4).next_multiple_of(LANES) as u64;
    if !threaded || workers == 1 || count <= chunk_len {
        return compute_leaves_chunk(params, prf_key, parameter, start_epoch, count);
    }

    let chunks: Vec<(u64, u64)> = {
        let mut chunks = Vec::new();
        let mut at = start_epoch;
        while at < start_epoch + count {
            let len = chunk_len.min(start_epoch + count - at);
            chunks.push((at, len));
            at += len;
        }
        chunks
    };

    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<Option<Vec<Domain>>>> = Mutex::new(vec![None; chunks.len()]);
    std::thread::scope(|scope| {
        for _ in 0..workers.min(chunks.len()) {
            scope.spawn(|| loop {
                let i = next.fetch_add(1, Ordering::Relaxed);
                let Some(&(at, len)) = chunks.get(i) else {
                    break;
                };
                let leaves = compute_leaves_chunk(params, prf_key, parameter, at, len);
                results.lock().unwrap()[i] = Some(leaves);
            });
        }
    });

    results
        .into_inner()
        .unwrap()
        .into_iter()
        .map(|chunk| chunk.expect("worker left a leaf chunk unfilled"))
        .collect::<Vec<_>>()
        .concat()
}

/// Build bottom tree `tree_index` covering epochs [B*L, (B+1)*L).
///
/// Deterministic in (prf_key, parameter, tree_index); padding randomness is a
/// zero-seeded stream independent of the activation window.
pub fn build_bottom_tree(
    params: &LifetimeParams,
    prf_key: &[u8; 32],
    parameter: &Parameter,
    tree_index: u64,
    threaded_leaves: bool,
) -> Result<HashSubTree, SignatureError> {
    let leaves_per_tree = params.leaves_per_bottom_tree();
    let start_epoch = tree_index * leaves_per_tree;
    let leaves = compute_leaf_range(
        params,
        prf_key,
        parameter,
        start_epoch,
        leaves_per_tree,
        threaded_leaves,
    );

    let mut pad_rng = ChaCha12Rng::from_seed([0u8; 32]);
    let mut next_pad = || random_domain(&mut pad_rng, params.hash_len_fe);
    build_layers(
        HashTreeLayer {
            start_index: start_epoch,
            nodes: leaves,
        },
        0,
        params.bottom_tree_height(),
        parameter,
        params,
        &mut next_pad,
    )
}

/// Build the top tree over bottom-tree roots.
///
/// `start_index` is the left bottom-tree index; padding consumes the scheme's
/// main RNG, serialized through its mutex.
pub fn build_top_tree(
    params: &LifetimeParams,
    roots: Vec<Domain>,
    start_index: u64,
    parameter: &Parameter,
    rng: &Mutex<ChaCha12Rng>,
) -> Result<HashSubTree, SignatureError> {
    let mut next_pad = || {
        let mut guard = rng.lock().unwrap();
        random_domain(&mut *guard, params.hash_len_fe)
    };
    build_layers(
        HashTreeLayer {
            start_index,
            nodes: roots,
        },
        params.bottom_tree_height() as u8,
        params.log_lifetime - params.bottom_tree_height(),
        parameter,
        params,
        &mut next_pad,
    )
}

/// Co-path from an absolute position in the bottommost stored layer to the
/// root, bottom-to-top.
pub fn extract_path(
    layers: &[HashTreeLayer],
    position: u64,
) -> Result<Vec<Domain>, SignatureError> {
    if layers.is_empty() {
        return Err(SignatureError::MalformedSubTree);
    }
    let mut pos = position;
    let mut out = Vec::with_capacity(layers.len() - 1);
    for layer in &layers[..layers.len() - 1] {
        let sibling = pos ^ 1;
        let index = sibling
            .checked_sub(layer.start_index)
            .ok_or(SignatureError::MalformedSubTree)?;
        let node = layer
            .nodes
            .get(index as usize)
            .copied()
            .ok_or(SignatureError::MalformedSubTree)?;
        out.push(node);
        pos >>= 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::random_parameter;
    use crate::params::LIFETIME_2_8;
    use rand::rngs::StdRng;

    fn test_pad_source() -> impl FnMut() -> Domain {
        let mut rng = ChaCha12Rng::from_seed([7u8; 32]);
        move || random_domain(&mut rng, 8)
    }

    #[test]
    fn test_padding_makes_start_and_len_even() {
        let mut pad = test_pad_source();
        for (start, len) in [(0u64, 4usize), (1, 4), (2, 3), (3, 3), (5, 1)] {
            let nodes: Vec<Domain> = (0..len).map(|_| pad()).collect();
            let original = nodes.clone();
            let layer = padded(
                HashTreeLayer {
                    start_index: start,
                    nodes,
                },
                &mut pad,
            );
            assert_eq!(layer.start_index & 1, 0, "odd start for ({start},{len})");
            assert_eq!(layer.nodes.len() & 1, 0, "odd len for ({start},{len})");
            // Original nodes are still there, in order, at the right offset.
            let shift = (start - layer.start_index) as usize;
            assert_eq!(&layer.nodes[shift..shift + len], &original[..]);
        }
    }

    #[test]
    fn test_bottom_tree_deterministic() {
        let params = LIFETIME_2_8;
        let prf_key = [3u8; 32];
        let parameter = random_parameter(&mut StdRng::seed_from_u64(1));
        let a = build_bottom_tree(&params, &prf_key, &parameter, 2, false).unwrap();
        let b = build_bottom_tree(&params, &prf_key, &parameter, 2, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.leaf_range(), 32..48);
        // height/2 padded layers plus the root layer
        assert_eq!(a.layers.len(), 5);
        assert_eq!(a.root, *a.layers.last().unwrap().nodes.first().unwrap());
    }

    #[test]
    fn test_leaf_range_packed_matches_scalar() {
        let params = LIFETIME_2_8;
        let prf_key = [9u8; 32];
        let parameter = random_parameter(&mut StdRng::seed_from_u64(2));
        // An unaligned count exercises the scalar tail next to the packed
        // batches.
        let count = LANES as u64 + 3;
        let mixed = compute_leaves_chunk(&params, &prf_key, &parameter, 0, count);
        let scalar: Vec<Domain> = (0..count)
            .map(|epoch| compute_leaf(&params, &prf_key, &parameter, epoch as u32))
            .collect();
        assert_eq!(mixed, scalar);
    }

    #[test]
    fn test_extract_path_length_and_membership() {
        let params = LIFETIME_2_8;
        let prf_key = [5u8; 32];
        let parameter = random_parameter(&mut StdRng::seed_from_u64(3));
        let tree = build_bottom_tree(&params, &prf_key, &parameter, 0, false).unwrap();

        for epoch in [0u64, 7, 15] {
            let path = extract_path(&tree.layers, epoch).unwrap();
            assert_eq!(path.len(), params.bottom_tree_height() as usize);
            // First co-path node is the leaf's sibling.
            assert_eq!(path[0], tree.layers[0].nodes[(epoch ^ 1) as usize]);
        }
    }

    #[test]
    fn test_top_tree_reaches_single_root() {
        let params = LIFETIME_2_8;
        let parameter = random_parameter(&mut StdRng::seed_from_u64(4));
        let rng = Mutex::new(ChaCha12Rng::from_seed([1u8; 32]));
        let mut pad = test_pad_source();
        let roots: Vec<Domain> = (0..2).map(|_| pad()).collect();

        let top = build_top_tree(&params, roots, 0, &parameter, &rng).unwrap();
        // Four padded levels plus the root layer.
        assert_eq!(top.layers.len(), 5);
        assert_eq!(top.layers.last().unwrap().nodes.len(), 1);
        let path = extract_path(&top.layers, 1).unwrap();
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn test_extract_path_out_of_range() {
        let params = LIFETIME_2_8;
        let prf_key = [5u8; 32];
        let parameter = random_parameter(&mut StdRng::seed_from_u64(3));
        let tree = build_bottom_tree(&params, &prf_key, &parameter, 1, false).unwrap();
        // Position below the layer's start underflows the sibling lookup.
        assert!(extract_path(&tree.layers, 2).is_err());
    }
}
