//! Target-sum message encoding.
//!
//! A message is hashed (one width-24 Poseidon2 compression over
//! rho || parameter || epoch tweak || message || iteration index) into 15
//! field elements, interpreted as an integer, reduced into the hypercube
//! domain and decoded into one chunk per chain. The encoder itself performs
//! no sum check: `sign` retries randomness until the chunks hit the target
//! sum, `verify` takes them as authoritative step counts.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use p3_field::PrimeCharacteristicRing;

use crate::error::SignatureError;
use crate::field::{
    to_canonical, Parameter, Randomness, F, MSG_LEN_FE, PARAMETER_LEN, TWEAK_LEN,
};
use crate::hypercube::LayerTable;
use crate::params::LifetimeParams;
use crate::poseidon2::poseidon_compress_24;
use crate::tweak_hash::PoseidonTweak;
use crate::{KOALABEAR_PRIME, MESSAGE_LENGTH};

/// Field elements produced by one message-hash invocation.
pub const MSG_HASH_OUT_LEN: usize = 15;

/// 32 message bytes as a little-endian integer, decomposed in base p.
///
/// p^9 exceeds 2^256, so the map is injective on full-length messages.
pub fn encode_message(message: &[u8; MESSAGE_LENGTH]) -> [F; MSG_LEN_FE] {
    let p = BigUint::from(KOALABEAR_PRIME);
    let mut acc = BigUint::from_bytes_le(message);
    let mut out = [F::ZERO; MSG_LEN_FE];
    for digit in &mut out {
        let d = (&acc % &p).to_u32().unwrap_or(0);
        acc /= &p;
        *digit = F::from_u32(d);
    }
    out
}

/// Message-hash tweak digits for an epoch.
pub fn encode_epoch(epoch: u32) -> [F; TWEAK_LEN] {
    PoseidonTweak::Message { epoch }.to_field_elements()
}

/// One message-hash invocation: 15 output field elements.
pub fn apply_message_hash(
    parameter: &Parameter,
    epoch: u32,
    rho: &Randomness,
    message: &[u8; MESSAGE_LENGTH],
    params: &LifetimeParams,
) -> [F; MSG_HASH_OUT_LEN] {
    let epoch_fe = encode_epoch(epoch);
    let message_fe = encode_message(message);

    let mut input =
        Vec::with_capacity(params.rand_len_fe + PARAMETER_LEN + TWEAK_LEN + MSG_LEN_FE + 1);
    input.extend_from_slice(&rho[..params.rand_len_fe]);
    input.extend_from_slice(parameter);
    input.extend_from_slice(&epoch_fe);
    input.extend_from_slice(&message_fe);
    // Single invocation, so the iteration index is always zero.
    input.push(F::ZERO);

    poseidon_compress_24::<MSG_HASH_OUT_LEN>(&input)
}

/// Encode a message into one chunk in [0, base) per chain.
pub fn encode(
    parameter: &Parameter,
    epoch: u32,
    rho: &Randomness,
    message: &[u8; MESSAGE_LENGTH],
    params: &LifetimeParams,
    table: &LayerTable,
) -> Result<Vec<u8>, SignatureError> {
    let hash = apply_message_hash(parameter, epoch, rho, message, params);

    // acc = sum of fe_i * p^i with fe_0 least significant.
    let p = BigUint::from(KOALABEAR_PRIME);
    let mut acc = BigUint::zero();
    for fe in hash.iter().rev() {
        acc = acc * &p + BigUint::from(to_canonical(*fe));
    }
    acc %= table.dom_size();

    let (layer, offset) = table.find_layer(&acc)?;
    table.map_to_vertex(layer, offset)
}
