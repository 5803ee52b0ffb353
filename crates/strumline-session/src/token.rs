use rand::Rng;

/// Generates a reconnection token: 16 random bytes as 32 lowercase hex
/// characters.
pub fn generate_reconnect_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
