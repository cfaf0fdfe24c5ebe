//! Trace token generation.
//!
//! Every enqueued record is tagged with a short random token so intake and
//! worker log lines can be correlated. The token is advisory only.

use rand::prelude::*;

/// The 53 symbols a token may contain.
pub const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-";

/// Token length used when none is configured.
pub const DEFAULT_TOKEN_LENGTH: usize = 12;

/// Generate a token of exactly `len` characters drawn uniformly from
/// [`TOKEN_ALPHABET`].
pub fn generate_token(len: usize) -> String {
    let mut rng = thread_rng();
    (0..len)
        .map(|_| *TOKEN_ALPHABET.choose(&mut rng).unwrap_or(&b'-') as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_size() {
        assert_eq!(TOKEN_ALPHABET.len(), 53);
        assert!(!TOKEN_ALPHABET.contains(&b' '));
    }

    #[test]
    fn test_token_shape() {
        for len in [1, 2, 12, 64, 257] {
            let token = generate_token(len);
            assert_eq!(token.len(), len);
            assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_token_empty() {
        assert_eq!(generate_token(0), "");
    }

    #[test]
    fn test_tokens_differ() {
        let a = generate_token(DEFAULT_TOKEN_LENGTH);
        let b = generate_token(DEFAULT_TOKEN_LENGTH);
        assert_ne!(a, b);
    }
}
