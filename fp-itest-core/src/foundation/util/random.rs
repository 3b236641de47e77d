use rand::RngCore;

/// Random lowercase hex string of `num_bytes` bytes (so `2 * num_bytes` characters).
pub fn random_hex(num_bytes: usize) -> String {
    let mut bytes = vec![0u8; num_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
