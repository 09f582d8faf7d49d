//! Generalized XMSS hash-based signatures over the KoalaBear field.
//!
//! This crate implements the stateful, forward-secure signature scheme used
//! by the hash-zig project: a two-level Merkle tree (bottom trees + top tree)
//! over one-time Winternitz-style leaves, with Poseidon2 as the tweakable
//! hash, a SHAKE-128 PRF for chain starting points, and a target-sum
//! hypercube encoding of the message hash.
//!
//! Layout:
//! - Hash: Poseidon2 over KoalaBear (p = 2^31 - 2^24 + 1), widths 16 and 24
//! - Hash output: 7 or 8 field elements depending on the lifetime profile
//! - Parameter: 5 field elements
//! - Encoding: 64 chains, base 8, target sum 375
//!
//! The supported key lifetimes are 2^8, 2^18 and 2^32 epochs; see
//! [`params::LifetimeParams`].

pub mod cache;
pub mod encoding;
pub mod error;
pub mod field;
pub mod hypercube;
pub mod params;
pub mod poseidon2;
pub mod prf;
pub mod scheme;
pub mod serialize;
pub mod tree;
pub mod tweak_hash;
pub mod types;

pub use error::SignatureError;
pub use field::F;
pub use params::{LifetimeParams, LIFETIME_2_18, LIFETIME_2_32, LIFETIME_2_8};
pub use scheme::GeneralizedXmss;
pub use types::{MerklePath, PublicKey, SecretKey, Signature};

/// Messages are always signed as fixed 32-byte digests.
pub const MESSAGE_LENGTH: usize = 32;

/// KoalaBear prime: p = 2^31 - 2^24 + 1.
pub const KOALABEAR_PRIME: u32 = 2_130_706_433;

/// Tweak separator byte for chain hashes.
pub const TWEAK_SEPARATOR_FOR_CHAIN_HASH: u8 = 0x00;
/// Tweak separator byte for tree hashes.
pub const TWEAK_SEPARATOR_FOR_TREE_HASH: u8 = 0x01;
/// Tweak separator byte for the message hash.
pub const TWEAK_SEPARATOR_FOR_MESSAGE_HASH: u8 = 0x02;
