use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over `data` with the shared `secret`, hex-encoded. This is the signature scheme used by the payment
/// gateway callback and the courier webhook.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    to_hex(&mac.finalize().into_bytes())
}

/// Constant-time check of a hex-encoded HMAC-SHA256 signature. A malformed hex string simply fails the check.
pub fn verify_hmac(secret: &str, data: &[u8], provided_hex: &str) -> bool {
    let provided = match from_hex(provided_hex) {
        Some(bytes) => bytes,
        None => return false,
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.verify_slice(&provided).is_ok()
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

pub fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok()).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let body = br#"{"trackId":"171812-ab12cd","amount":500000}"#;
        let sig = calculate_hmac("top-secret", body);
        assert!(verify_hmac("top-secret", body, &sig));
    }

    #[test]
    fn tampered_body_fails() {
        let sig = calculate_hmac("top-secret", b"amount=500000");
        assert!(!verify_hmac("top-secret", b"amount=900000", &sig));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = calculate_hmac("top-secret", b"payload");
        assert!(!verify_hmac("other-secret", b"payload", &sig));
    }

    #[test]
    fn malformed_hex_fails_closed() {
        assert!(!verify_hmac("top-secret", b"payload", "not-hex!"));
        assert!(!verify_hmac("top-secret", b"payload", "abc"));
    }

    #[test]
    fn hex_round_trip() {
        let bytes = [0u8, 1, 127, 128, 255];
        assert_eq!(from_hex(&to_hex(&bytes)).unwrap(), bytes);
    }
}
