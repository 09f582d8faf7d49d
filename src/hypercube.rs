//! Hypercube layer tables for the target-sum encoding.
//!
//! For base w and dimension v, `sizes[v][d]` counts the length-v base-w
//! strings whose digits sum to d. The counts for the production parameters
//! (w = 8, v = 64) approach 8^64, so everything here is `BigUint`.
//!
//! A vertex is addressed by its distance layer d from the all-(w-1) corner:
//! a decoded vertex `a` satisfies sum(w - 1 - a_i) = d.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::SignatureError;

/// Precomputed layer sizes and prefix sums for one (base, dimension) pair,
/// truncated at `max_layer`.
#[derive(Debug, Clone)]
pub struct LayerTable {
    base: usize,
    dimension: usize,
    max_layer: usize,
    /// sizes[v][d] for v in 0..=dimension, d in 0..=max_layer.
    sizes: Vec<Vec<BigUint>>,
    /// prefix_sums[v][d] = sum of sizes[v][0..=d].
    prefix_sums: Vec<Vec<BigUint>>,
}

impl LayerTable {
    pub fn new(base: usize, dimension: usize, max_layer: usize) -> Self {
        let mut sizes: Vec<Vec<BigUint>> = Vec::with_capacity(dimension + 1);
        let mut first = vec![BigUint::zero(); max_layer + 1];
        first[0] = BigUint::one();
        sizes.push(first);

        for v in 1..=dimension {
            let mut row = vec![BigUint::zero(); max_layer + 1];
            for d in 0..=max_layer {
                let mut total = BigUint::zero();
                for t in 0..=d.min(base - 1) {
                    total += &sizes[v - 1][d - t];
                }
                row[d] = total;
            }
            sizes.push(row);
        }

        let prefix_sums = sizes
            .iter()
            .map(|row| {
                let mut acc = BigUint::zero();
                row.iter()
                    .map(|size| {
                        acc += size;
                        acc.clone()
                    })
                    .collect()
            })
            .collect();

        Self {
            base,
            dimension,
            max_layer,
            sizes,
            prefix_sums,
        }
    }

    /// Number of admissible indices: vertices in layers 0..=max_layer.
    pub fn dom_size(&self) -> &BigUint {
        &self.prefix_sums[self.dimension][self.max_layer]
    }

    /// Locate the layer containing `index` and the offset within it.
    pub fn find_layer(&self, index: &BigUint) -> Result<(usize, BigUint), SignatureError> {
        let row = &self.prefix_sums[self.dimension];
        for d in 0..=self.max_layer {
            if index < &row[d] {
                let offset = if d == 0 {
                    index.clone()
                } else {
                    index - &row[d - 1]
                };
                return Ok((d, offset));
            }
        }
        Err(SignatureError::InvalidHypercubeIndex)
    }

    /// Decode (layer, offset) into a vertex of the hypercube.
    ///
    /// Digits come out most-significant-first per the counting recurrence;
    /// each emitted digit a satisfies w - 1 - a = the portion of the layer
    /// distance consumed at that position.
    pub fn map_to_vertex(
        &self,
        layer: usize,
        offset: BigUint,
    ) -> Result<Vec<u8>, SignatureError> {
        let w = self.base;
        let v = self.dimension;
        if layer > self.max_layer {
            return Err(SignatureError::InvalidHypercubeMapping { layer });
        }

        let mut d = layer;
        let mut x = offset;
        let mut out = Vec::with_capacity(v);

        for i in 1..v {
            let remaining = v - i;
            let lo = d.saturating_sub((w - 1) * remaining);
            let hi = (w - 1).min(d);
            let mut chosen = None;
            for j in lo..=hi {
                let part = &self.sizes[remaining][d - j];
                if &x >= part {
                    x -= part;
                } else {
                    chosen = Some(j);
                    break;
                }
            }
            let j = chosen.ok_or(SignatureError::InvalidHypercubeMapping { layer })?;
            out.push((w - 1 - j) as u8);
            d -= j;
        }

        // One digit left: it must absorb the whole remaining distance.
        if d > w - 1 || !x.is_zero() {
            return Err(SignatureError::InvalidHypercubeMapping { layer });
        }
        out.push((w - 1 - d) as u8);
        Ok(out)
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn max_layer(&self) -> usize {
        self.max_layer
    }

    /// Layer distance of a vertex: sum of (base - 1 - digit).
    pub fn vertex_layer(&self, vertex: &[u8]) -> usize {
        vertex
            .iter()
            .map(|&a| self.base - 1 - a as usize)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::ToPrimitive;

    fn index_range(table: &LayerTable) -> std::ops::Range<u64> {
        0..table.dom_size().to_u64().expect("table too large to enumerate")
    }

    #[test]
    fn test_full_table_counts_all_strings() {
        // With the full digit range the layer sizes partition w^v.
        let w = 8usize;
        let v = 3usize;
        let table = LayerTable::new(w, v, v * (w - 1));
        let total: BigUint = (0..=v * (w - 1)).map(|d| table.sizes[v][d].clone()).sum();
        assert_eq!(total, BigUint::from(512u32));
        assert_eq!(table.dom_size(), &BigUint::from(512u32));
    }

    #[test]
    fn test_prefix_sums_monotonic() {
        let table = LayerTable::new(8, 4, 20);
        let row = &table.prefix_sums[4];
        for d in 1..row.len() {
            assert!(row[d - 1] <= row[d]);
        }
    }

    #[test]
    fn test_binomial_row_for_base_2() {
        // Base 2: sizes[v][d] = C(v, d).
        let table = LayerTable::new(2, 5, 5);
        let expected = [1u32, 5, 10, 10, 5, 1];
        for (d, &c) in expected.iter().enumerate() {
            assert_eq!(table.sizes[5][d], BigUint::from(c));
        }
    }

    #[test]
    fn test_decode_round_trips_small_cube() {
        // Enumerate the whole admissible range of a base-3 cube and check the
        // decoded vertices are distinct, in-range, and in the right layer.
        let table = LayerTable::new(3, 3, 6);
        let mut seen = std::collections::HashSet::new();
        for index in index_range(&table) {
            let (layer, offset) = table.find_layer(&BigUint::from(index)).unwrap();
            let vertex = table.map_to_vertex(layer, offset).unwrap();
            assert_eq!(vertex.len(), 3);
            assert!(vertex.iter().all(|&a| (a as usize) < 3));
            assert_eq!(table.vertex_layer(&vertex), layer);
            assert!(seen.insert(vertex));
        }
        // All 27 strings appear since max_layer covers the full cube.
        assert_eq!(seen.len(), 27);
    }

    #[test]
    fn test_find_layer_rejects_out_of_range() {
        let table = LayerTable::new(3, 3, 2);
        let out_of_range = table.dom_size().clone();
        assert_eq!(
            table.find_layer(&out_of_range),
            Err(SignatureError::InvalidHypercubeIndex)
        );
    }

    #[test]
    fn test_production_table_last_index() {
        // The last admissible index decodes into the deepest layer: the
        // vertex sits at distance 77 from the all-7 corner.
        let table = LayerTable::new(8, 64, 77);
        let last = table.dom_size() - BigUint::one();
        let (layer, offset) = table.find_layer(&last).unwrap();
        assert_eq!(layer, 77);
        let vertex = table.map_to_vertex(layer, offset).unwrap();
        assert_eq!(table.vertex_layer(&vertex), 77);
        let chunk_sum: usize = vertex.iter().map(|&a| a as usize).sum();
        assert_eq!(chunk_sum, 64 * 7 - 77);
    }
}
