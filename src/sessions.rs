use rand::RngCore;

/// Number of random bytes backing a session token. Hex-encoded this
/// yields a 64-character identifier.
const SESSION_TOKEN_BYTES: usize = 32;

/// Generates an opaque session token for an anonymous shopper.
///
/// Tokens are 32 bytes of OS randomness, hex encoded. They carry no
/// embedded state; the cart they point at lives in the database.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Checks whether a client-supplied session token has the shape we
/// issue. Malformed tokens are rejected before any database lookup.
pub fn is_valid_session_token(token: &str) -> bool {
    token.len() == SESSION_TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_valid_and_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert!(is_valid_session_token(&a));
        assert!(is_valid_session_token(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(!is_valid_session_token(""));
        assert!(!is_valid_session_token("short"));
        assert!(!is_valid_session_token(&"g".repeat(64)));
        assert!(!is_valid_session_token(&"a".repeat(63)));
        assert!(!is_valid_session_token(&"a".repeat(65)));
    }

    #[test]
    fn accepts_uppercase_hex() {
        assert!(is_valid_session_token(&"A1".repeat(32)));
    }
}
