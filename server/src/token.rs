//! Session tokens.
//!
//! A token is 32 bytes from the OS random source, URL-safe base64 encoded.
//! It is both the session key and the only credential a client holds, so it
//! must never come from a seeded or predictable generator.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use std::borrow::Borrow;
use std::fmt;

const TOKEN_BYTES: usize = 32;

/// Opaque session identifier and credential.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Mint a fresh token from the OS CSPRNG.
    pub fn generate() -> Result<Self, rand::Error> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self(URL_SAFE.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters only, for logs.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0
    }
}

// Debug and Display both redact; the full value is a credential.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({}…)", self.short())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_url_safe_base64_of_32_bytes() {
        let token = Token::generate().unwrap();
        assert_eq!(token.as_str().len(), 44);
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '='));
        let decoded = URL_SAFE.decode(token.as_str()).unwrap();
        assert_eq!(decoded.len(), TOKEN_BYTES);
    }

    #[test]
    fn tokens_are_unique() {
        let a = Token::generate().unwrap();
        let b = Token::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn display_redacts() {
        let token = Token::generate().unwrap();
        let shown = format!("{token}");
        assert!(!shown.contains(token.as_str()));
        assert!(shown.starts_with(token.short()));
    }
}
