//! Secret key material and its one-time lazy initialization

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::debug;
use zeroize::Zeroizing;

use crate::entropy::{random_bytes, EntropySource};
use crate::error::Result;

/// Length of secrets generated on first use
pub const GENERATED_SECRET_LEN: usize = 256;

/// HMAC key bytes, wrapped in `Zeroizing` so they are erased when dropped
pub struct Secret(Zeroizing<Vec<u8>>);

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<u8>> for Secret {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Secret {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<{} bytes redacted>)", self.0.len())
    }
}

/// Observable lifecycle of a [`SecretCell`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretState {
    Unset,
    Initializing,
    Set,
}

/// Holds a secret that is established at most once.
///
/// Either filled at construction, or lazily on the first call to
/// [`get_or_generate`](Self::get_or_generate). Exactly one caller generates;
/// concurrent callers block on `init` until the secret is published. Once set,
/// the secret never changes.
pub(crate) struct SecretCell {
    value: OnceLock<Secret>,
    init: Mutex<()>,
    initializing: AtomicBool,
}

impl SecretCell {
    pub(crate) fn empty() -> Self {
        Self {
            value: OnceLock::new(),
            init: Mutex::new(()),
            initializing: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_secret(secret: Secret) -> Self {
        Self {
            value: OnceLock::from(secret),
            init: Mutex::new(()),
            initializing: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> SecretState {
        if self.value.get().is_some() {
            SecretState::Set
        } else if self.initializing.load(Ordering::Acquire) {
            SecretState::Initializing
        } else {
            SecretState::Unset
        }
    }

    /// Return the secret, generating it from `source` if it has not been set.
    ///
    /// A failed generation leaves the cell unset; the error goes to this caller
    /// only and the next caller tries again.
    pub(crate) fn get_or_generate(&self, source: &dyn EntropySource) -> Result<&Secret> {
        if let Some(secret) = self.value.get() {
            return Ok(secret);
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished while we waited for the lock.
        if let Some(secret) = self.value.get() {
            return Ok(secret);
        }

        let _initializing = InitializingFlag::raise(&self.initializing);
        let bytes = random_bytes(source, GENERATED_SECRET_LEN)?;
        let secret = self.value.get_or_init(|| Secret::new(bytes));
        debug!(len = secret.len(), "Generated mint secret");

        Ok(secret)
    }
}

/// Marks the cell as initializing for as long as it lives
struct InitializingFlag<'a>(&'a AtomicBool);

impl<'a> InitializingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InitializingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
