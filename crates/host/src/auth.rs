//! Shared-secret authentication
//!
//! Every file route requires the configured secret in the `passwd` query
//! parameter. Verification compares HMAC-SHA256 digests under a random
//! per-process key, so its timing depends on neither the secret nor the
//! length of the supplied value.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

/// Length of generated secrets in bytes (32 bytes = 256 bits)
const TOKEN_LENGTH: usize = 32;

/// Length of the per-process HMAC key in bytes
const KEY_LENGTH: usize = 32;

/// Environment variable consulted when no inline secret is given
pub const PASSWD_ENV: &str = "FSGATE_PASSWD";

type HmacSha256 = Hmac<Sha256>;

/// Missing or mismatched credential; deliberately carries no detail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unauthorized;

impl fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unauthorized")
    }
}

impl std::error::Error for Unauthorized {}

/// Validates the shared secret configured at startup
pub struct AuthGate {
    key: [u8; KEY_LENGTH],
    expected: Vec<u8>,
}

impl AuthGate {
    pub fn new(secret: &str) -> Self {
        let mut key = [0u8; KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let expected = compute_hmac(&key, secret.as_bytes());
        Self { key, expected }
    }

    /// Check a supplied credential against the configured secret
    pub fn check(&self, supplied: Option<&str>) -> Result<(), Unauthorized> {
        let supplied = supplied.ok_or(Unauthorized)?;
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(supplied.as_bytes());
        mac.verify_slice(&self.expected).map_err(|_| Unauthorized)
    }
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate").finish_non_exhaustive()
    }
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Generate a cryptographically secure random secret
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; TOKEN_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Read a secret from file, trimming surrounding whitespace
pub fn read_token_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open passwd file {}", path.display()))?;
    let mut token = String::new();
    file.read_to_string(&mut token)
        .context("Failed to read passwd file")?;
    Ok(token.trim().to_string())
}

/// Resolve the shared secret: inline value, then environment, then file
pub fn resolve_credential(inline: Option<&str>, token_file: Option<&Path>) -> Result<String> {
    if let Some(token) = inline.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    if let Ok(env_token) = std::env::var(PASSWD_ENV) {
        if !env_token.is_empty() {
            return Ok(env_token);
        }
    }

    if let Some(path) = token_file {
        let token = read_token_file(path)?;
        if token.is_empty() {
            bail!("passwd file {} is empty", path.display());
        }
        return Ok(token);
    }

    bail!("no passwd configured: pass --passwd, set {PASSWD_ENV}, or give --passwd-file")
}
