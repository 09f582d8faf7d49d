//! On-disk cache for bottom trees.
//!
//! Keygen writes every bottom tree it builds; advance_preparation reads them
//! back instead of recomputing. Any integrity problem (bad magic, version,
//! mismatched key material, truncation) is a cache miss, never an error.

use std::fs;
use std::path::PathBuf;

use crate::field::Parameter;
use crate::params::LifetimeParams;
use crate::serialize::{read_parameter, read_subtree, write_parameter, write_subtree, ByteReader};
use crate::tree::HashSubTree;

/// "BTC1": bottom-tree cache, format 1.
pub const CACHE_MAGIC: u32 = 0x4254_4331;
pub const CACHE_VERSION: u8 = 1;

/// Presence of this variable disables the cache entirely.
pub const ENV_DISABLE: &str = "HASH_ZIG_DISABLE_BT_CACHE";
/// Overrides the cache directory.
pub const ENV_CACHE_DIR: &str = "HASH_ZIG_BT_CACHE_DIR";
const DEFAULT_CACHE_DIR: &str = "tmp/bottom_tree_cache";

/// Cache handle; configuration is read from the environment once at scheme
/// construction.
#[derive(Debug, Clone)]
pub struct BottomTreeCache {
    directory: PathBuf,
    enabled: bool,
}

impl BottomTreeCache {
    pub fn from_env() -> Self {
        let enabled = std::env::var_os(ENV_DISABLE).is_none();
        let directory = std::env::var_os(ENV_CACHE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        Self { directory, enabled }
    }

    /// Cache with an explicit directory (tests).
    pub fn at_directory(directory: PathBuf) -> Self {
        Self {
            directory,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            directory: PathBuf::new(),
            enabled: false,
        }
    }

    fn file_path(&self, params: &LifetimeParams, tree_index: u64) -> PathBuf {
        self.directory
            .join(format!("bt_{:02}_{:08x}.bin", params.log_lifetime, tree_index))
    }

    /// Load a bottom tree; `None` on miss or any integrity problem.
    pub fn load(
        &self,
        params: &LifetimeParams,
        prf_key: &[u8; 32],
        parameter: &Parameter,
        tree_index: u64,
    ) -> Option<HashSubTree> {
        if !self.enabled {
            return None;
        }
        let bytes = fs::read(self.file_path(params, tree_index)).ok()?;
        parse_record(&bytes, params, prf_key, parameter, tree_index)
    }

    /// Store a bottom tree; failures are ignored, the cache is best-effort.
    pub fn store(
        &self,
        params: &LifetimeParams,
        prf_key: &[u8; 32],
        parameter: &Parameter,
        tree_index: u64,
        tree: &HashSubTree,
    ) {
        if !self.enabled {
            return;
        }
        if fs::create_dir_all(&self.directory).is_err() {
            return;
        }
        let bytes = encode_record(params, prf_key, parameter, tree_index, tree);
        let _ = fs::write(self.file_path(params, tree_index), bytes);
    }
}

fn encode_record(
    params: &LifetimeParams,
    prf_key: &[u8; 32],
    parameter: &Parameter,
    tree_index: u64,
    tree: &HashSubTree,
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&CACHE_MAGIC.to_le_bytes());
    out.push(CACHE_VERSION);
    out.push(params.log_lifetime as u8);
    // Reserved; readers accept any value.
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(tree_index as u32).to_le_bytes());
    out.extend_from_slice(prf_key);
    write_parameter(&mut out, parameter);
    write_subtree(&mut out, tree, params);
    out
}

fn parse_record(
    bytes: &[u8],
    params: &LifetimeParams,
    prf_key: &[u8; 32],
    parameter: &Parameter,
    tree_index: u64,
) -> Option<HashSubTree> {
    let mut reader = ByteReader::new(bytes);
    if reader.read_u32().ok()? != CACHE_MAGIC {
        return None;
    }
    if reader.read_u8().ok()? != CACHE_VERSION {
        return None;
    }
    if reader.read_u8().ok()? != params.log_lifetime as u8 {
        return None;
    }
    let _reserved = reader.read_u16().ok()?;
    if reader.read_u32().ok()? != tree_index as u32 {
        return None;
    }
    if reader.take(32).ok()? != prf_key {
        return None;
    }
    if read_parameter(&mut reader).ok()? != *parameter {
        return None;
    }
    let tree = read_subtree(&mut reader, params).ok()?;
    reader.finish().ok()?;
    // The record must be self-consistent before it is trusted.
    if tree.layers.last()?.nodes.first()? != &tree.root {
        return None;
    }
    Some(tree)
}
