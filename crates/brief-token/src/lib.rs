//! Compact, tamper-evident tokens: opaque data plus an expiry, signed with HMAC-SHA256.
//!
//! A [`Mint`] stamps tokens with its secret and later checks them:
//!
//! ```rust
//! use brief_token::Mint;
//! use chrono::{Duration, Utc};
//!
//! let mint = Mint::new(b"your secret hmac key".to_vec());
//! let token = mint.sign(b"your tamper proof data", Utc::now() + Duration::hours(1)).unwrap();
//!
//! let cookie_value = token.to_string();
//! let verified = mint.verify_string(&cookie_value).unwrap();
//! assert_eq!(verified.payload(), b"your tamper proof data");
//! ```
//!
//! The wire form is `<base64url(data)>.<YYYYMMDDHHMMSS>.<base64url(signature)>`,
//! with the timestamp always expressed in UTC.

pub mod clock;
pub mod codec;
pub mod entropy;
pub mod error;
pub mod mint;
pub mod secret;

pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{encode, Token};
pub use entropy::{EntropySource, OsEntropy};
pub use error::{Result, TokenError};
pub use mint::Mint;
pub use secret::{Secret, SecretState, GENERATED_SECRET_LEN};
