//! Random tokens for download links, hook credentials and save names.
//!
//! Tokens are base64url (no padding) encodings of OS randomness. Uniqueness
//! is enforced by the owning store: [`allocate_token`] retries against the
//! store's live lookup table until it finds a free value.

use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

use crate::error::{Result, StoreError};

/// Attempts before a store gives up on finding a free token.
pub const MAX_TOKEN_ATTEMPTS: usize = 10_000;

/// Pause after the generator comes back empty (entropy starvation).
const STARVED_BACKOFF: Duration = Duration::from_millis(20);

/// Random bytes behind a download / auth token (20 chars once encoded).
const TOKEN_BYTES: usize = 15;

/// Random bytes behind a save-name suffix (16 chars once encoded).
const SAVE_NAME_BYTES: usize = 12;

/// Random bytes behind a version suffix (8 chars once encoded).
const VERSION_BYTES: usize = 6;

const PASSWORD_CHARS: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ~!@#$%^&*_-+=";

/// Produces candidate tokens. `None` means the generator is starved.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Default source: 15 bytes from the OS RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn token(&self) -> Option<String> {
        gen_token()
    }
}

fn random_encoded(n: usize) -> Option<String> {
    let mut buf = vec![0u8; n];
    OsRng.try_fill_bytes(&mut buf).ok()?;
    Some(URL_SAFE_NO_PAD.encode(buf))
}

/// One candidate download / auth token.
pub fn gen_token() -> Option<String> {
    random_encoded(TOKEN_BYTES)
}

/// Random suffix for on-disk save names.
pub fn gen_save_suffix() -> String {
    random_encoded(SAVE_NAME_BYTES).unwrap_or_default()
}

/// Short random suffix for version stamps.
pub fn gen_short() -> String {
    random_encoded(VERSION_BYTES).unwrap_or_default()
}

/// Random printable password, used for the shadow super user.
pub fn gen_password(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| PASSWORD_CHARS[rng.gen_range(0..PASSWORD_CHARS.len())] as char)
        .collect()
}

/// Draw tokens from `source` until one is not `taken`.
///
/// Fails with [`StoreError::TokenGeneration`] after [`MAX_TOKEN_ATTEMPTS`].
pub fn allocate_token(
    kind: &'static str,
    source: &dyn TokenSource,
    taken: impl Fn(&str) -> bool,
) -> Result<String> {
    for _ in 0..MAX_TOKEN_ATTEMPTS {
        match source.token() {
            Some(token) if !token.is_empty() => {
                if !taken(&token) {
                    return Ok(token);
                }
            }
            _ => thread::sleep(STARVED_BACKOFF),
        }
    }
    log::error!("gave up generating a {} token", kind);
    Err(StoreError::TokenGeneration { kind })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed list of tokens, then repeats the last one forever.
    pub(crate) struct ScriptedTokens {
        tokens: Mutex<Vec<String>>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedTokens {
        pub(crate) fn new(tokens: &[&str]) -> Self {
            let mut tokens: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
            tokens.reverse();
            Self {
                tokens: Mutex::new(tokens),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TokenSource for ScriptedTokens {
        fn token(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut tokens = self.tokens.lock().unwrap();
            if tokens.len() > 1 {
                tokens.pop()
            } else {
                tokens.last().cloned()
            }
        }
    }

    #[test]
    fn gen_token_is_url_safe() {
        let token = gen_token().unwrap();
        assert_eq!(token.len(), 20);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn short_and_save_suffix_lengths() {
        assert_eq!(gen_short().len(), 8);
        assert_eq!(gen_save_suffix().len(), 16);
    }

    #[test]
    fn gen_password_uses_charset() {
        let pwd = gen_password(10);
        assert_eq!(pwd.len(), 10);
        assert!(pwd.bytes().all(|b| PASSWORD_CHARS.contains(&b)));
    }

    #[test]
    fn allocate_skips_taken_tokens() {
        let source = ScriptedTokens::new(&["aaa", "bbb", "ccc"]);
        let token = allocate_token("test", &source, |t| t == "aaa" || t == "bbb").unwrap();
        assert_eq!(token, "ccc");
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn allocate_gives_up_after_bounded_attempts() {
        let source = ScriptedTokens::new(&["same"]);
        let err = allocate_token("test", &source, |_| true).unwrap_err();
        assert!(matches!(err, StoreError::TokenGeneration { kind: "test" }));
        assert_eq!(source.calls.load(Ordering::SeqCst), MAX_TOKEN_ATTEMPTS);
    }
}
