//! Public types: keys, signatures, Merkle paths.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::field::{Domain, Parameter, Randomness};
use crate::tree::HashSubTree;

/// Combined bottom + top co-path of one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub co_path: Vec<Domain>,
}

/// Signature for one epoch.
///
/// `path` holds the bottom co-path followed by the top co-path
/// (log_lifetime domain elements in total); `rho` is the encoding randomness
/// padded to its fixed width; `hashes` holds one intermediate chain state per
/// chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub path: MerklePath,
    pub rho: Randomness,
    pub hashes: Vec<Domain>,
}

/// Public key: Merkle root over the activation window plus the public
/// parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub root: Domain,
    pub parameter: Parameter,
}

/// Secret key with the currently prepared pair of bottom trees.
///
/// The key exclusively owns its three subtrees; signing hands out copies of
/// path nodes, never references into the layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKey {
    pub(crate) prf_key: [u8; 32],
    pub(crate) parameter: Parameter,
    pub(crate) activation_epoch: u64,
    pub(crate) num_active_epochs: u64,
    pub(crate) top_tree: HashSubTree,
    pub(crate) left_bottom_tree_index: u64,
    pub(crate) left_bottom_tree: HashSubTree,
    pub(crate) right_bottom_tree: HashSubTree,
}

impl SecretKey {
    /// Epochs the key was activated for.
    pub fn activation_interval(&self) -> Range<u64> {
        self.activation_epoch..self.activation_epoch + self.num_active_epochs
    }

    /// Epochs signable right now: the two prepared bottom trees.
    pub fn get_prepared_interval(&self) -> Range<u64> {
        let left = &self.left_bottom_tree.layers[0];
        let leaves_per_tree = left.nodes.len() as u64;
        left.start_index..left.start_index + 2 * leaves_per_tree
    }

    /// Index of the left prepared bottom tree.
    pub fn left_bottom_tree_index(&self) -> u64 {
        self.left_bottom_tree_index
    }

    pub fn parameter(&self) -> &Parameter {
        &self.parameter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::DOMAIN_LEN;
    use crate::tree::HashTreeLayer;
    use p3_field::PrimeCharacteristicRing;

    fn dummy_tree(start_index: u64, leaves: usize) -> HashSubTree {
        let node = [crate::F::ZERO; DOMAIN_LEN];
        HashSubTree {
            root: node,
            layers: vec![
                HashTreeLayer {
                    start_index,
                    nodes: vec![node; leaves],
                },
                HashTreeLayer {
                    start_index: start_index >> 1,
                    nodes: vec![node],
                },
            ],
        }
    }

    #[test]
    fn test_prepared_interval_tracks_left_tree() {
        let sk = SecretKey {
            prf_key: [0u8; 32],
            parameter: [crate::F::ZERO; 5],
            activation_epoch: 0,
            num_active_epochs: 256,
            top_tree: dummy_tree(0, 2),
            left_bottom_tree_index: 3,
            left_bottom_tree: dummy_tree(48, 16),
            right_bottom_tree: dummy_tree(64, 16),
        };
        assert_eq!(sk.get_prepared_interval(), 48..80);
        assert_eq!(sk.activation_interval(), 0..256);
    }
}
