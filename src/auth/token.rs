use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::AuthError;

/// Fill a buffer from the operating system's CSPRNG. Exhaustion of the
/// random source is a hard failure; callers must never substitute a
/// weaker generator.
pub fn random_bytes(n: usize) -> Result<Vec<u8>, AuthError> {
    let mut buf = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| AuthError::GenerationFailure(e.to_string()))?;
    Ok(buf)
}

/// URL-safe, unpadded encoding of `n` random bytes. Used for bearer
/// secrets and rotation-family ids; at n >= 16 the collision probability
/// is negligible.
pub fn random_token_url(n: usize) -> Result<String, AuthError> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes(n)?))
}

/// Monotonic counter for non-secret, human-correlatable identifiers such
/// as user/session/verification serials. Values are guessable, so this
/// must never back anything that needs to be unguessable.
pub struct SerialGenerator {
    counter: AtomicU64,
}

impl SerialGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for SerialGenerator {
    fn default() -> Self {
        Self::new()
    }
}
