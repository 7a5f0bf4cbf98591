//! Cryptographically secure random bytes

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Result, TokenError};

/// Secure random byte source, used for generated secrets and random payloads
pub trait EntropySource: Send + Sync {
    /// Fill `buf` entirely or fail
    fn fill(&self, buf: &mut [u8]) -> Result<()>;
}

/// The operating system's CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| TokenError::RandomSource(e.to_string()))
    }
}

impl<E: EntropySource + ?Sized> EntropySource for std::sync::Arc<E> {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        (**self).fill(buf)
    }
}

/// Allocate `len` bytes and fill them from `source`
pub(crate) fn random_bytes(source: &dyn EntropySource, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    source.fill(&mut buf)?;
    Ok(buf)
}
