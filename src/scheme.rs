//! Scheme orchestration: key generation, signing, verification and the
//! sliding bottom-tree preparation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha12Rng;

use crate::cache::BottomTreeCache;
use crate::encoding::encode;
use crate::error::SignatureError;
use crate::field::{random_parameter, Domain, Parameter};
use crate::hypercube::LayerTable;
use crate::params::LifetimeParams;
use crate::prf::{prf_domain, prf_randomness};
use crate::tree::{build_bottom_tree, build_top_tree, extract_path, HashSubTree};
use crate::tweak_hash::{chain, leaf_reduce, tree_hash};
use crate::types::{MerklePath, PublicKey, SecretKey, Signature};
use crate::MESSAGE_LENGTH;

/// Randomness counters tried before sign gives up.
const MAX_ENCODING_ATTEMPTS: u64 = 100_000;

/// Generalized XMSS scheme instance.
///
/// Owns the two pieces of mutable state shared across operations: the main
/// RNG (parameter/key sampling and top-tree padding) and the lazily built
/// hypercube layer tables. Both sit behind their own mutex.
pub struct GeneralizedXmss {
    params: LifetimeParams,
    rng: Mutex<ChaCha12Rng>,
    layer_tables: Mutex<HashMap<(usize, usize, usize), Arc<LayerTable>>>,
    cache: BottomTreeCache,
}

impl GeneralizedXmss {
    /// Set up a scheme instance from a 32-byte seed.
    pub fn new(params: LifetimeParams, seed: [u8; 32]) -> Self {
        params.validate();
        Self {
            params,
            rng: Mutex::new(ChaCha12Rng::from_seed(seed)),
            layer_tables: Mutex::new(HashMap::new()),
            cache: BottomTreeCache::from_env(),
        }
    }

    pub fn params(&self) -> &LifetimeParams {
        &self.params
    }

    /// Layer table for the scheme's encoding, built on first use.
    fn layer_table(&self) -> Arc<LayerTable> {
        let key = (
            self.params.base,
            self.params.dimension,
            self.params.final_layer,
        );
        let mut tables = self.layer_tables.lock().unwrap();
        tables
            .entry(key)
            .or_insert_with(|| Arc::new(LayerTable::new(key.0, key.1, key.2)))
            .clone()
    }

    fn load_or_build_bottom_tree(
        &self,
        prf_key: &[u8; 32],
        parameter: &Parameter,
        tree_index: u64,
        threaded_leaves: bool,
    ) -> Result<HashSubTree, SignatureError> {
        if let Some(tree) = self.cache.load(&self.params, prf_key, parameter, tree_index) {
            return Ok(tree);
        }
        let tree = build_bottom_tree(&self.params, prf_key, parameter, tree_index, threaded_leaves)?;
        self.cache
            .store(&self.params, prf_key, parameter, tree_index, &tree);
        Ok(tree)
    }

    /// Generate a key pair for `[activation_epoch, activation_epoch +
    /// num_active_epochs)`.
    ///
    /// The window is expanded to whole bottom trees (at least two). The first
    /// two trees are built up front and retained as the prepared pair; the
    /// remaining trees are built by worker threads and only their roots are
    /// kept.
    pub fn key_gen(
        &self,
        activation_epoch: u64,
        num_active_epochs: u64,
    ) -> Result<(PublicKey, SecretKey), SignatureError> {
        let lifetime = self.params.lifetime();
        let window_end = activation_epoch
            .checked_add(num_active_epochs)
            .filter(|&end| end <= lifetime && num_active_epochs > 0)
            .ok_or(SignatureError::InvalidActivationParameters {
                activation_epoch,
                num_active_epochs,
            })?;

        // Expand to whole bottom trees and enforce the two-tree minimum.
        let leaves_per_tree = self.params.leaves_per_bottom_tree();
        let mut start = activation_epoch - activation_epoch % leaves_per_tree;
        let mut end = window_end.div_ceil(leaves_per_tree) * leaves_per_tree;
        if end - start < 2 * leaves_per_tree {
            end = (start + 2 * leaves_per_tree).min(lifetime);
        }
        if end - start < 2 * leaves_per_tree {
            start = end.saturating_sub(2 * leaves_per_tree);
        }
        let start_tree = start / leaves_per_tree;
        let end_tree = end / leaves_per_tree;
        if end_tree - start_tree < 2 {
            return Err(SignatureError::InsufficientBottomTrees {
                available: end_tree - start_tree,
            });
        }

        // Parameter first, PRF key second; both from the main RNG.
        let (parameter, prf_key) = {
            let mut rng = self.rng.lock().unwrap();
            let parameter = random_parameter(&mut *rng);
            let mut prf_key = [0u8; 32];
            rng.fill_bytes(&mut prf_key);
            (parameter, prf_key)
        };

        // The prepared pair is built first and kept.
        let left = self.load_or_build_bottom_tree(&prf_key, &parameter, start_tree, true)?;
        let right = self.load_or_build_bottom_tree(&prf_key, &parameter, start_tree + 1, true)?;

        let tree_count = (end_tree - start_tree) as usize;
        let mut roots: Vec<Option<Domain>> = vec![None; tree_count];
        roots[0] = Some(left.root);
        roots[1] = Some(right.root);

        // Remaining trees are deterministic in their index, so workers may
        // claim them in any order.
        if tree_count > 2 {
            let next = AtomicUsize::new(2);
            let slots: Mutex<&mut Vec<Option<Domain>>> = Mutex::new(&mut roots);
            let failure: Mutex<Option<SignatureError>> = Mutex::new(None);
            let workers = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(tree_count - 2);
            std::thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| loop {
                        if failure.lock().unwrap().is_some() {
                            break;
                        }
                        let offset = next.fetch_add(1, Ordering::Relaxed);
                        if offset >= tree_count {
                            break;
                        }
                        let tree_index = start_tree + offset as u64;
                        match self.load_or_build_bottom_tree(
                            &prf_key, &parameter, tree_index, false,
                        ) {
                            Ok(tree)
                                if tree.layers.last().and_then(|l| l.nodes.first())
                                    == Some(&tree.root) =>
                            {
                                slots.lock().unwrap()[offset] = Some(tree.root)
                            }
                            Ok(_) => {
                                let mut failure = failure.lock().unwrap();
                                if failure.is_none() {
                                    *failure = Some(SignatureError::MalformedSubTree);
                                }
                                break;
                            }
                            Err(error) => {
                                let mut failure = failure.lock().unwrap();
                                if failure.is_none() {
                                    *failure = Some(error);
                                }
                                break;
                            }
                        }
                    });
                }
            });
            if let Some(error) = failure.into_inner().unwrap() {
                return Err(error);
            }
        }

        let roots: Vec<Domain> = roots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(SignatureError::MalformedSubTree)?;

        // Catch ordering bugs before the top tree bakes them in.
        for (tree, root) in [(&left, roots[0]), (&right, roots[1])] {
            let final_layer = tree.layers.last().ok_or(SignatureError::MalformedSubTree)?;
            if final_layer.nodes.first() != Some(&root) {
                return Err(SignatureError::MalformedSubTree);
            }
        }

        let top_tree = build_top_tree(&self.params, roots, start_tree, &parameter, &self.rng)?;
        let public_key = PublicKey {
            root: top_tree.root,
            parameter,
        };
        let secret_key = SecretKey {
            prf_key,
            parameter,
            activation_epoch,
            num_active_epochs,
            top_tree,
            left_bottom_tree_index: start_tree,
            left_bottom_tree: left,
            right_bottom_tree: right,
        };
        Ok((public_key, secret_key))
    }

    /// Sign a 32-byte message digest under one epoch.
    pub fn sign(
        &self,
        secret_key: &SecretKey,
        epoch: u32,
        message: &[u8; MESSAGE_LENGTH],
    ) -> Result<Signature, SignatureError> {
        let params = &self.params;
        let at = epoch as u64;
        if !secret_key.activation_interval().contains(&at) {
            return Err(SignatureError::KeyNotActive { epoch });
        }
        if !secret_key.get_prepared_interval().contains(&at) {
            return Err(SignatureError::EpochNotPrepared { epoch });
        }

        let leaves_per_tree = params.leaves_per_bottom_tree();
        let tree_index = at / leaves_per_tree;
        let bottom_tree = if tree_index == secret_key.left_bottom_tree_index {
            &secret_key.left_bottom_tree
        } else {
            &secret_key.right_bottom_tree
        };

        let mut co_path = extract_path(&bottom_tree.layers, at)?;
        co_path.extend(extract_path(&secret_key.top_tree.layers, tree_index)?);

        // Randomness search: retry counters until the chunks hit the target
        // sum. Off-target encodings are local to this loop.
        let table = self.layer_table();
        for counter in 0..MAX_ENCODING_ATTEMPTS {
            let rho = prf_randomness(
                &secret_key.prf_key,
                epoch,
                message,
                counter,
                params.rand_len_fe,
            );
            let chunks = encode(&secret_key.parameter, epoch, &rho, message, params, &table)?;
            let sum: usize = chunks.iter().map(|&c| c as usize).sum();
            if sum != params.target_sum {
                continue;
            }

            let hashes = chunks
                .iter()
                .enumerate()
                .map(|(chain_index, &steps)| {
                    let start = prf_domain(
                        &secret_key.prf_key,
                        epoch,
                        chain_index as u64,
                        params.hash_len_fe,
                    );
                    chain(
                        &start,
                        epoch,
                        chain_index as u8,
                        0,
                        steps as usize,
                        &secret_key.parameter,
                        params,
                    )
                })
                .collect();

            return Ok(Signature {
                path: MerklePath { co_path },
                rho,
                hashes,
            });
        }
        Err(SignatureError::EncodingAttemptsExceeded {
            attempts: MAX_ENCODING_ATTEMPTS,
        })
    }

    /// Verify a signature. `Ok(false)` means a cryptographic mismatch; errors
    /// are reserved for structurally invalid input.
    pub fn verify(
        &self,
        public_key: &PublicKey,
        epoch: u32,
        message: &[u8; MESSAGE_LENGTH],
        signature: &Signature,
    ) -> Result<bool, SignatureError> {
        let params = &self.params;
        if (epoch as u64) >= params.lifetime() {
            return Err(SignatureError::EpochOutOfRange { epoch });
        }
        if signature.path.co_path.len() != params.log_lifetime as usize {
            return Err(SignatureError::MalformedSignature {
                reason: "wrong co-path length",
            });
        }
        if signature.hashes.len() != params.dimension {
            return Err(SignatureError::MalformedSignature {
                reason: "wrong chain count",
            });
        }

        // The recomputed chunks are authoritative; no sum check here.
        let table = self.layer_table();
        let chunks = encode(
            &public_key.parameter,
            epoch,
            &signature.rho,
            message,
            params,
            &table,
        )?;

        let ends: Vec<Domain> = chunks
            .iter()
            .zip(signature.hashes.iter())
            .enumerate()
            .map(|(chain_index, (&steps, state))| {
                chain(
                    state,
                    epoch,
                    chain_index as u8,
                    steps,
                    params.base - 1 - steps as usize,
                    &public_key.parameter,
                    params,
                )
            })
            .collect();
        let leaf = leaf_reduce(&ends, &public_key.parameter, epoch, params);

        let mut current = leaf;
        let mut position = epoch as u64;
        for (level, sibling) in signature.path.co_path.iter().enumerate() {
            let (left, right) = if position & 1 == 0 {
                (current, *sibling)
            } else {
                (*sibling, current)
            };
            position >>= 1;
            current = tree_hash(
                &left,
                &right,
                level as u8,
                position,
                &public_key.parameter,
                params,
            );
        }

        let live = params.hash_len_fe;
        Ok(current[..live] == public_key.root[..live])
    }

    /// Slide the prepared window forward by one bottom tree.
    ///
    /// No-op when the window already touches the end of the activation
    /// interval. The incoming tree is loaded from the disk cache when a valid
    /// record exists, otherwise recomputed.
    pub fn advance_preparation(
        &self,
        secret_key: &mut SecretKey,
    ) -> Result<(), SignatureError> {
        let leaves_per_tree = self.params.leaves_per_bottom_tree();
        let window_end = secret_key.activation_epoch + secret_key.num_active_epochs;
        if secret_key.left_bottom_tree_index * leaves_per_tree + 3 * leaves_per_tree > window_end
        {
            return Ok(());
        }

        let incoming_index = secret_key.left_bottom_tree_index + 2;
        let incoming = self.load_or_build_bottom_tree(
            &secret_key.prf_key,
            &secret_key.parameter,
            incoming_index,
            true,
        )?;
        let old_right = std::mem::replace(&mut secret_key.right_bottom_tree, incoming);
        secret_key.left_bottom_tree = old_right;
        secret_key.left_bottom_tree_index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::LIFETIME_2_8;

    fn scheme() -> GeneralizedXmss {
        GeneralizedXmss::new(LIFETIME_2_8, [0u8; 32])
    }

    #[test]
    fn test_key_gen_rejects_bad_windows() {
        let scheme = scheme();
        assert!(matches!(
            scheme.key_gen(0, 0),
            Err(SignatureError::InvalidActivationParameters { .. })
        ));
        assert!(matches!(
            scheme.key_gen(200, 100),
            Err(SignatureError::InvalidActivationParameters { .. })
        ));
        assert!(matches!(
            scheme.key_gen(u64::MAX, 2),
            Err(SignatureError::InvalidActivationParameters { .. })
        ));
    }

    #[test]
    fn test_small_window_expands_to_two_trees() {
        let scheme = scheme();
        let (_, sk) = scheme.key_gen(40, 3).unwrap();
        // Window [40, 43) expands to trees 2 and 3.
        assert_eq!(sk.left_bottom_tree_index(), 2);
        assert_eq!(sk.get_prepared_interval(), 32..64);
    }

    #[test]
    fn test_window_at_lifetime_end_shifts_down() {
        let scheme = scheme();
        let (_, sk) = scheme.key_gen(250, 6).unwrap();
        assert_eq!(sk.left_bottom_tree_index(), 14);
        assert_eq!(sk.get_prepared_interval(), 224..256);
    }

    #[test]
    fn test_sign_outside_activation_fails() {
        let scheme = scheme();
        let (_, sk) = scheme.key_gen(0, 32).unwrap();
        let message = [0u8; 32];
        assert_eq!(
            scheme.sign(&sk, 100, &message),
            Err(SignatureError::KeyNotActive { epoch: 100 })
        );
    }

    #[test]
    fn test_verify_rejects_structurally_bad_input() {
        let scheme = scheme();
        let (pk, sk) = scheme.key_gen(0, 32).unwrap();
        let message = [7u8; 32];
        let signature = scheme.sign(&sk, 0, &message).unwrap();

        assert_eq!(
            scheme.verify(&pk, 400, &message, &signature),
            Err(SignatureError::EpochOutOfRange { epoch: 400 })
        );

        let mut truncated = signature.clone();
        truncated.path.co_path.pop();
        assert!(matches!(
            scheme.verify(&pk, 0, &message, &truncated),
            Err(SignatureError::MalformedSignature { .. })
        ));

        let mut missing_chain = signature;
        missing_chain.hashes.pop();
        assert!(matches!(
            scheme.verify(&pk, 0, &message, &missing_chain),
            Err(SignatureError::MalformedSignature { .. })
        ));
    }
}
