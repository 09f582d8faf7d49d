use std::env;

use leansig::field::{from_canonical, Domain, DOMAIN_LEN, F, MAX_RAND_LEN, PARAMETER_LEN};
use leansig::types::{MerklePath, PublicKey, Signature};
use leansig::{GeneralizedXmss, LIFETIME_2_8};
use p3_field::PrimeCharacteristicRing;
use serde_json::Value;

fn parse_hex_or_number(value: &Value) -> Option<u32> {
    if let Some(s) = value.as_str() {
        let trimmed = s.trim();
        let clean = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u32::from_str_radix(clean, 16).ok()
    } else {
        value.as_u64().map(|n| n as u32)
    }
}

fn parse_domain(value: &Value) -> Option<Domain> {
    let items = value.as_array()?;
    let mut out = [F::ZERO; DOMAIN_LEN];
    for (slot, item) in out.iter_mut().zip(items.iter()) {
        *slot = from_canonical(parse_hex_or_number(item)?);
    }
    Some(out)
}

/// Bridge shape: canonical (possibly hex-string) numbers, path.nodes instead
/// of path.co_path.
fn parse_bridge_public_key(value: &Value) -> Option<PublicKey> {
    let root = parse_domain(value.get("root")?)?;
    let parameter_items = value.get("parameter")?.as_array()?;
    if parameter_items.len() != PARAMETER_LEN {
        return None;
    }
    let mut parameter = [F::ZERO; PARAMETER_LEN];
    for (slot, item) in parameter.iter_mut().zip(parameter_items.iter()) {
        *slot = from_canonical(parse_hex_or_number(item)?);
    }
    Some(PublicKey { root, parameter })
}

fn parse_bridge_signature(value: &Value) -> Option<Signature> {
    let path = value.get("path")?;
    let nodes = path.get("nodes").or_else(|| path.get("co_path"))?.as_array()?;
    let co_path = nodes.iter().map(parse_domain).collect::<Option<Vec<_>>>()?;

    let rho_items = value.get("rho")?.as_array()?;
    let mut rho = [F::ZERO; MAX_RAND_LEN];
    for (slot, item) in rho.iter_mut().zip(rho_items.iter()) {
        *slot = from_canonical(parse_hex_or_number(item)?);
    }

    let hashes = value
        .get("hashes")?
        .as_array()?
        .iter()
        .map(parse_domain)
        .collect::<Option<Vec<_>>>()?;

    Some(Signature {
        path: MerklePath { co_path },
        rho,
        hashes,
    })
}

fn main() {
    let public_key_data = env::var("PUBLIC_KEY").unwrap_or_default();
    let signature_data = env::var("SIGNATURE").unwrap_or_default();
    let message = env::var("MESSAGE").unwrap_or_default();
    let epoch: u32 = env::var("EPOCH")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    if public_key_data.is_empty() || signature_data.is_empty() || message.is_empty() {
        eprintln!("Missing PUBLIC_KEY, SIGNATURE, or MESSAGE environment variables");
        std::process::exit(1);
    }

    let mut message_bytes = [0u8; 32];
    let message_slice = message.as_bytes();
    let copy_len = message_slice.len().min(32);
    message_bytes[..copy_len].copy_from_slice(&message_slice[..copy_len]);

    let pk_json = public_key_data
        .strip_prefix("PUBLIC_KEY:")
        .unwrap_or(&public_key_data);
    let sig_json = signature_data
        .strip_prefix("SIGNATURE:")
        .unwrap_or(&signature_data);

    // Seed is irrelevant for verification.
    let scheme = GeneralizedXmss::new(LIFETIME_2_8, [0u8; 32]);

    // Native serde shape first (Montgomery numbers, path.co_path).
    let native_pk: Result<PublicKey, _> = serde_json::from_str(pk_json);
    let native_sig: Result<Signature, _> = serde_json::from_str(sig_json);
    if let (Ok(pk), Ok(signature)) = (native_pk, native_sig) {
        let is_valid = scheme
            .verify(&pk, epoch, &message_bytes, &signature)
            .unwrap_or(false);
        println!("VERIFY_RESULT:{}", is_valid);
        return;
    }

    // Fall back to the bridge shape with canonical values.
    let pk_value: Value = match serde_json::from_str(pk_json) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("VERIFY_DEBUG: failed to parse PUBLIC_KEY JSON: {}", e);
            println!("VERIFY_RESULT:false");
            return;
        }
    };
    let sig_value: Value = match serde_json::from_str(sig_json) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("VERIFY_DEBUG: failed to parse SIGNATURE JSON: {}", e);
            println!("VERIFY_RESULT:false");
            return;
        }
    };

    let (Some(pk), Some(signature)) = (
        parse_bridge_public_key(&pk_value),
        parse_bridge_signature(&sig_value),
    ) else {
        eprintln!("VERIFY_DEBUG: bridge-shape parse failed");
        println!("VERIFY_RESULT:false");
        return;
    };

    match scheme.verify(&pk, epoch, &message_bytes, &signature) {
        Ok(is_valid) => println!("VERIFY_RESULT:{}", is_valid),
        Err(e) => {
            eprintln!("VERIFY_DEBUG: structural error: {}", e);
            println!("VERIFY_RESULT:false");
        }
    }
}
