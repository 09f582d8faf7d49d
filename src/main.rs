use std::env;
use std::fs::File;
use std::io::Write;
use std::time::Instant;

use leansig::serialize::public_key_to_bytes;
use leansig::{GeneralizedXmss, LifetimeParams, LIFETIME_2_18, LIFETIME_2_8, MESSAGE_LENGTH};
use serde_json::json;
use sha3::{Digest, Sha3_256};

fn parse_seed(seed_hex: &str) -> [u8; 32] {
    let mut seed = [0u8; 32];
    if let Ok(bytes) = hex::decode(seed_hex) {
        let len = bytes.len().min(32);
        seed[..len].copy_from_slice(&bytes[..len]);
    }
    seed
}

fn profile_from_env() -> LifetimeParams {
    match env::var("LOG_LIFETIME").as_deref() {
        Ok("18") => LIFETIME_2_18,
        _ => LIFETIME_2_8,
    }
}

fn main() {
    let params = profile_from_env();
    let lifetime = params.lifetime();

    println!("leansig Key Generation Benchmark");
    println!("=================================");
    println!("Lifetime: 2^{} = {} signatures", params.log_lifetime, lifetime);
    println!("Architecture: Generalized XMSS, two-level tree");
    println!("Profile: {}", params.name);
    println!(
        "Parameters: dim={}, base={}, target_sum={}, hash_fe={}",
        params.dimension, params.base, params.target_sum, params.hash_len_fe
    );
    println!();

    // SEED_HEX: 64 hex chars => 32 bytes. Default to 0x42 repeated.
    let seed_hex = env::var("SEED_HEX").unwrap_or_else(|_| "42".repeat(32));
    let seed = parse_seed(&seed_hex);
    println!("SEED: {}", hex::encode(seed));

    let scheme = GeneralizedXmss::new(params, seed);

    println!("Generating keypair (Generalized XMSS)...");
    let start = Instant::now();
    let (pk, mut sk) = scheme
        .key_gen(0, lifetime)
        .expect("key generation should succeed");
    let keygen_time = start.elapsed().as_secs_f64();
    println!("Key generation completed in {:.3} seconds", keygen_time);
    println!();

    // Fixed-size message derived from the seed for reproducibility.
    let mut message = [0u8; MESSAGE_LENGTH];
    for (i, byte) in message.iter_mut().enumerate() {
        *byte = seed[i % seed.len()];
    }

    let sign_start = Instant::now();
    let epoch = 0u32;
    while !sk.get_prepared_interval().contains(&(epoch as u64)) {
        scheme.advance_preparation(&mut sk).expect("preparation");
    }
    let signature = scheme.sign(&sk, epoch, &message).expect("signing should succeed");
    let sign_time = sign_start.elapsed().as_secs_f64();

    let verify_start = Instant::now();
    let verify_ok = scheme
        .verify(&pk, epoch, &message, &signature)
        .expect("structurally valid signature");
    let verify_time = verify_start.elapsed().as_secs_f64();

    let root_bytes_full = public_key_to_bytes(&pk, &params);
    // parameter (20 bytes) comes first; the root follows.
    let root_bytes = &root_bytes_full[20..];

    let bincode_len = bincode::serialize(&pk).map(|b| b.len()).unwrap_or(0);
    println!("DEBUG: bincode serialized pk size: {} bytes", bincode_len);

    let mut hasher = Sha3_256::new();
    hasher.update(root_bytes);
    let digest = hex::encode(hasher.finalize());
    let pk_hex = hex::encode(root_bytes);

    println!("PUBLIC_KEY_STRUCT:");
    println!("  Root size: {} bytes", root_bytes.len());
    println!("  Root hex: {}", pk_hex);

    let output_json = json!({
        "implementation": "leansig",
        "profile": params.name,
        "parameters": {
            "dimension": params.dimension,
            "base": params.base,
            "target_sum": params.target_sum,
            "tree_height": params.log_lifetime,
            "lifetime": lifetime,
            "hash_function": "Poseidon2KoalaBear"
        },
        "timing": {
            "keygen_seconds": keygen_time,
            "sign_seconds": sign_time,
            "verify_seconds": verify_time
        },
        "keys": {
            "seed": hex::encode(seed),
            "public_key_hex": pk_hex,
            "public_key_sha3": digest,
            "public_key_size_bytes": root_bytes.len()
        },
        "verification": {
            "signature_valid": verify_ok
        }
    });

    let json_filename = "leansig_public_key.json";
    match File::create(json_filename) {
        Ok(mut file) => {
            if let Err(e) = file.write_all(
                serde_json::to_string_pretty(&output_json)
                    .expect("json encoding")
                    .as_bytes(),
            ) {
                eprintln!("Failed to write JSON file: {}", e);
            } else {
                println!("Saved public key to {}", json_filename);
            }
        }
        Err(e) => eprintln!("Failed to create JSON file: {}", e),
    }
    println!();

    println!("BENCHMARK_SEED: {}", hex::encode(seed));
    println!("PUBLIC_SHA3: {}", digest);
    println!("PUBLIC_KEY_HEX: {}", pk_hex);
    println!("VERIFY_OK: {}", verify_ok);
    println!("BENCHMARK_RESULT: {:.6}", keygen_time);
}
