//! Byte formats for keys, signatures and subtrees.
//!
//! Field elements are written as the 4 little-endian bytes of their
//! Montgomery representation. All counts that follow from the lifetime
//! profile are implicit; only the per-subtree layer list carries explicit
//! length prefixes.

use crate::error::SignatureError;
use crate::field::{
    fe_from_le_bytes, fe_to_le_bytes, Domain, Parameter, Randomness, DOMAIN_LEN, F, MAX_RAND_LEN,
    PARAMETER_LEN,
};
use crate::params::LifetimeParams;
use crate::tree::{HashSubTree, HashTreeLayer};
use crate::types::{MerklePath, PublicKey, SecretKey, Signature};
use p3_field::PrimeCharacteristicRing;

/// Cursor over an input buffer; every read is bounds-checked.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0 }
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], SignatureError> {
        let end = self
            .at
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| SignatureError::Serialization {
                message: format!("unexpected end of input at offset {}", self.at),
            })?;
        let out = &self.bytes[self.at..end];
        self.at = end;
        Ok(out)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, SignatureError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, SignatureError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, SignatureError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, SignatureError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_fe(&mut self) -> Result<F, SignatureError> {
        let bytes = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        fe_from_le_bytes(buf).ok_or_else(|| SignatureError::Serialization {
            message: "field element out of range".to_string(),
        })
    }

    pub(crate) fn finish(&self) -> Result<(), SignatureError> {
        if self.at != self.bytes.len() {
            return Err(SignatureError::Serialization {
                message: format!("{} trailing bytes", self.bytes.len() - self.at),
            });
        }
        Ok(())
    }
}

pub(crate) fn write_domain(out: &mut Vec<u8>, domain: &Domain, hash_len_fe: usize) {
    for &x in &domain[..hash_len_fe] {
        out.extend_from_slice(&fe_to_le_bytes(x));
    }
}

pub(crate) fn read_domain(
    reader: &mut ByteReader<'_>,
    hash_len_fe: usize,
) -> Result<Domain, SignatureError> {
    let mut out = [F::ZERO; DOMAIN_LEN];
    for slot in out.iter_mut().take(hash_len_fe) {
        *slot = reader.read_fe()?;
    }
    Ok(out)
}

pub(crate) fn write_parameter(out: &mut Vec<u8>, parameter: &Parameter) {
    for &x in parameter {
        out.extend_from_slice(&fe_to_le_bytes(x));
    }
}

pub(crate) fn read_parameter(reader: &mut ByteReader<'_>) -> Result<Parameter, SignatureError> {
    let mut out = [F::ZERO; PARAMETER_LEN];
    for slot in &mut out {
        *slot = reader.read_fe()?;
    }
    Ok(out)
}

/// signature = path || rho || hashes.
pub fn signature_to_bytes(signature: &Signature, params: &LifetimeParams) -> Vec<u8> {
    let hash_len = params.hash_len_fe;
    let mut out = Vec::with_capacity(
        (signature.path.co_path.len() + signature.hashes.len()) * hash_len * 4
            + params.rand_len_fe * 4,
    );
    for node in &signature.path.co_path {
        write_domain(&mut out, node, hash_len);
    }
    for &x in &signature.rho[..params.rand_len_fe] {
        out.extend_from_slice(&fe_to_le_bytes(x));
    }
    for state in &signature.hashes {
        write_domain(&mut out, state, hash_len);
    }
    out
}

pub fn signature_from_bytes(
    bytes: &[u8],
    params: &LifetimeParams,
) -> Result<Signature, SignatureError> {
    let mut reader = ByteReader::new(bytes);
    let mut co_path = Vec::with_capacity(params.log_lifetime as usize);
    for _ in 0..params.log_lifetime {
        co_path.push(read_domain(&mut reader, params.hash_len_fe)?);
    }
    let mut rho: Randomness = [F::ZERO; MAX_RAND_LEN];
    for slot in rho.iter_mut().take(params.rand_len_fe) {
        *slot = reader.read_fe()?;
    }
    let mut hashes = Vec::with_capacity(params.dimension);
    for _ in 0..params.dimension {
        hashes.push(read_domain(&mut reader, params.hash_len_fe)?);
    }
    reader.finish()?;
    Ok(Signature {
        path: MerklePath { co_path },
        rho,
        hashes,
    })
}

/// public key = parameter || root.
pub fn public_key_to_bytes(public_key: &PublicKey, params: &LifetimeParams) -> Vec<u8> {
    let mut out = Vec::with_capacity((PARAMETER_LEN + params.hash_len_fe) * 4);
    write_parameter(&mut out, &public_key.parameter);
    write_domain(&mut out, &public_key.root, params.hash_len_fe);
    out
}

pub fn public_key_from_bytes(
    bytes: &[u8],
    params: &LifetimeParams,
) -> Result<PublicKey, SignatureError> {
    let mut reader = ByteReader::new(bytes);
    let parameter = read_parameter(&mut reader)?;
    let root = read_domain(&mut reader, params.hash_len_fe)?;
    reader.finish()?;
    Ok(PublicKey { root, parameter })
}

pub(crate) fn write_subtree(out: &mut Vec<u8>, tree: &HashSubTree, params: &LifetimeParams) {
    write_domain(out, &tree.root, params.hash_len_fe);
    out.extend_from_slice(&(tree.layers.len() as u32).to_le_bytes());
    for layer in &tree.layers {
        out.extend_from_slice(&layer.start_index.to_le_bytes());
        out.extend_from_slice(&(layer.nodes.len() as u32).to_le_bytes());
        for node in &layer.nodes {
            write_domain(out, node, params.hash_len_fe);
        }
    }
}

pub(crate) fn read_subtree(
    reader: &mut ByteReader<'_>,
    params: &LifetimeParams,
) -> Result<HashSubTree, SignatureError> {
    let root = read_domain(reader, params.hash_len_fe)?;
    let num_layers = reader.read_u32()? as usize;
    let mut layers = Vec::with_capacity(num_layers);
    for _ in 0..num_layers {
        let start_index = reader.read_u64()?;
        let node_count = reader.read_u32()? as usize;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            nodes.push(read_domain(reader, params.hash_len_fe)?);
        }
        layers.push(HashTreeLayer { start_index, nodes });
    }
    if layers.is_empty() {
        return Err(SignatureError::Serialization {
            message: "subtree without layers".to_string(),
        });
    }
    Ok(HashSubTree { root, layers })
}

/// secret key = prf_key || parameter || activation window || left index ||
/// top tree || left bottom tree || right bottom tree.
pub fn secret_key_to_bytes(secret_key: &SecretKey, params: &LifetimeParams) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&secret_key.prf_key);
    write_parameter(&mut out, &secret_key.parameter);
    out.extend_from_slice(&secret_key.activation_epoch.to_le_bytes());
    out.extend_from_slice(&secret_key.num_active_epochs.to_le_bytes());
    out.extend_from_slice(&(secret_key.left_bottom_tree_index as u32).to_le_bytes());
    write_subtree(&mut out, &secret_key.top_tree, params);
    write_subtree(&mut out, &secret_key.left_bottom_tree, params);
    write_subtree(&mut out, &secret_key.right_bottom_tree, params);
    out
}

pub fn secret_key_from_bytes(
    bytes: &[u8],
    params: &LifetimeParams,
) -> Result<SecretKey, SignatureError> {
    let mut reader = ByteReader::new(bytes);
    let mut prf_key = [0u8; 32];
    prf_key.copy_from_slice(reader.take(32)?);
    let parameter = read_parameter(&mut reader)?;
    let activation_epoch = reader.read_u64()?;
    let num_active_epochs = reader.read_u64()?;
    let left_bottom_tree_index = reader.read_u32()? as u64;
    let top_tree = read_subtree(&mut reader, params)?;
    let left_bottom_tree = read_subtree(&mut reader, params)?;
    let right_bottom_tree = read_subtree(&mut reader, params)?;
    reader.finish()?;
    Ok(SecretKey {
        prf_key,
        parameter,
        activation_epoch,
        num_active_epochs,
        top_tree,
        left_bottom_tree_index,
        left_bottom_tree,
        right_bottom_tree,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{random_domain, random_parameter};
    use crate::params::{LIFETIME_2_18, LIFETIME_2_8};
    use crate::KOALABEAR_PRIME;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_signature(params: &LifetimeParams, seed: u64) -> Signature {
        let mut rng = StdRng::seed_from_u64(seed);
        let co_path = (0..params.log_lifetime)
            .map(|_| random_domain(&mut rng, params.hash_len_fe))
            .collect();
        let mut rho = [F::ZERO; MAX_RAND_LEN];
        for slot in rho.iter_mut().take(params.rand_len_fe) {
            *slot = crate::field::random_fe(&mut rng);
        }
        let hashes = (0..params.dimension)
            .map(|_| random_domain(&mut rng, params.hash_len_fe))
            .collect();
        Signature {
            path: MerklePath { co_path },
            rho,
            hashes,
        }
    }

    #[test]
    fn test_signature_round_trip() {
        for params in [LIFETIME_2_8, LIFETIME_2_18] {
            let signature = sample_signature(&params, 42);
            let bytes = signature_to_bytes(&signature, &params);
            let expected_len = (params.log_lifetime as usize + params.dimension)
                * params.hash_len_fe
                * 4
                + params.rand_len_fe * 4;
            assert_eq!(bytes.len(), expected_len);
            let decoded = signature_from_bytes(&bytes, &params).unwrap();
            assert_eq!(decoded, signature);
        }
    }

    #[test]
    fn test_signature_rejects_truncation() {
        let params = LIFETIME_2_8;
        let signature = sample_signature(&params, 1);
        let mut bytes = signature_to_bytes(&signature, &params);
        bytes.pop();
        assert!(signature_from_bytes(&bytes, &params).is_err());
    }

    #[test]
    fn test_public_key_round_trip() {
        let params = LIFETIME_2_8;
        let mut rng = StdRng::seed_from_u64(2);
        let public_key = PublicKey {
            root: random_domain(&mut rng, params.hash_len_fe),
            parameter: random_parameter(&mut rng),
        };
        let bytes = public_key_to_bytes(&public_key, &params);
        assert_eq!(bytes.len(), (5 + 8) * 4);
        assert_eq!(public_key_from_bytes(&bytes, &params).unwrap(), public_key);
    }

    #[test]
    fn test_serialized_montgomery_words_in_range() {
        let params = LIFETIME_2_8;
        let signature = sample_signature(&params, 3);
        let bytes = signature_to_bytes(&signature, &params);
        for word in bytes.chunks_exact(4) {
            let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            assert!(value < KOALABEAR_PRIME);
        }
    }

    #[test]
    fn test_rejects_out_of_range_element() {
        let params = LIFETIME_2_8;
        let signature = sample_signature(&params, 4);
        let mut bytes = signature_to_bytes(&signature, &params);
        bytes[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(signature_from_bytes(&bytes, &params).is_err());
    }
}
