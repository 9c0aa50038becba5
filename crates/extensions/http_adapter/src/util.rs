/// Mirrors the identity-store/scheduler hex-token idiom used elsewhere in the
/// workspace for generated secrets and client ids.
pub fn random_token(hex_chars: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    (0..hex_chars)
        .map(|_| HEX[fastrand::usize(0..HEX.len())] as char)
        .collect()
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
