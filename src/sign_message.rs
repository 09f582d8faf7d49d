use std::env;

use leansig::field::monty_reduce;
use leansig::{GeneralizedXmss, LIFETIME_2_8, MESSAGE_LENGTH};

/// Serde emits field elements in Montgomery form; the bridge wants canonical
/// numbers, so rewrite every number in place.
fn convert_monty_numbers(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(monty) = n.as_u64() {
                let canonical = monty_reduce(monty) as u64;
                *value = serde_json::Value::Number(serde_json::Number::from(canonical));
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                convert_monty_numbers(item);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                convert_monty_numbers(item);
            }
        }
        _ => {}
    }
}

fn main() {
    let message = env::var("MESSAGE").unwrap_or_default();
    let epoch: u32 = env::var("EPOCH")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    if message.is_empty() {
        eprintln!("Missing MESSAGE environment variable");
        std::process::exit(1);
    }

    let seed_hex = env::var("SEED_HEX").unwrap_or_else(|_| "42".repeat(32));
    let mut seed = [0u8; 32];
    if let Ok(bytes) = hex::decode(&seed_hex) {
        let len = bytes.len().min(32);
        seed[..len].copy_from_slice(&bytes[..len]);
    }

    let params = LIFETIME_2_8;
    let scheme = GeneralizedXmss::new(params, seed);
    let (pk, mut sk) = scheme
        .key_gen(0, params.lifetime())
        .expect("key generation failed");

    let mut message_bytes = [0u8; MESSAGE_LENGTH];
    let bytes = message.as_bytes();
    let copy_len = bytes.len().min(MESSAGE_LENGTH);
    message_bytes[..copy_len].copy_from_slice(&bytes[..copy_len]);

    while !sk.get_prepared_interval().contains(&(epoch as u64)) {
        scheme.advance_preparation(&mut sk).expect("preparation failed");
    }

    let signature = scheme.sign(&sk, epoch, &message_bytes).expect("signing failed");
    debug_assert!(scheme
        .verify(&pk, epoch, &message_bytes, &signature)
        .unwrap_or(false));

    let mut pk_value = serde_json::to_value(&pk).expect("serialize pk");
    let mut sig_value = serde_json::to_value(&signature).expect("serialize sig");

    // Bridge shape: path.co_path is called path.nodes on the wire.
    if let Some(sig_obj) = sig_value.as_object_mut() {
        if let Some(path_obj) = sig_obj.get_mut("path").and_then(|p| p.as_object_mut()) {
            if let Some(co_path) = path_obj.remove("co_path") {
                path_obj.insert("nodes".to_string(), co_path);
            }
        }
    }

    convert_monty_numbers(&mut pk_value);
    convert_monty_numbers(&mut sig_value);

    println!("SIGNATURE:{}", sig_value);
    println!("PUBLIC_KEY:{}", pk_value);
}
