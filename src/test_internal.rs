use leansig::{GeneralizedXmss, LIFETIME_2_8, MESSAGE_LENGTH};
use rand::RngCore;

fn main() {
    println!("Testing internal signing and verification...");

    let mut seed = [0u8; 32];
    rand::rng().fill_bytes(&mut seed);
    let params = LIFETIME_2_8;
    let scheme = GeneralizedXmss::new(params, seed);

    println!("Generating keypair...");
    let (pk, mut sk) = scheme.key_gen(0, params.lifetime()).expect("keygen failed");

    let test_message = "Hello, leansig internal test!";
    let epoch = 0u32;

    let mut message_bytes = [0u8; MESSAGE_LENGTH];
    let message_slice = test_message.as_bytes();
    let copy_len = message_slice.len().min(MESSAGE_LENGTH);
    message_bytes[..copy_len].copy_from_slice(&message_slice[..copy_len]);

    println!("Signing message...");
    while !sk.get_prepared_interval().contains(&(epoch as u64)) {
        scheme.advance_preparation(&mut sk).expect("preparation failed");
    }

    let signature = match scheme.sign(&sk, epoch, &message_bytes) {
        Ok(sig) => sig,
        Err(e) => {
            println!("FAILED: signing failed: {}", e);
            return;
        }
    };

    println!("Verifying signature...");
    let is_valid = scheme
        .verify(&pk, epoch, &message_bytes, &signature)
        .unwrap_or(false);

    println!("Result: {}", is_valid);
    if is_valid {
        println!("SUCCESS: internal signing and verification works!");
    } else {
        println!("FAILED: internal verification failed!");
    }
}
