//! Token shape and its textual wire form
//!
//! ```text
//! <base64url(payload)> "." <YYYYMMDDHHMMSS> "." <base64url(signature)>
//! ```
//!
//! Binary fields use the URL-safe alphabet without padding, so the `.` separator
//! can never appear inside a field. The timestamp is always UTC.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::{Result, TokenError};

const SEPARATOR: char = '.';
const TIMESTAMP_LEN: usize = 14;
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Encode arbitrary bytes the same way the binary token fields are encoded.
///
/// Handy for displaying a payload without serializing the whole token.
pub fn encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Signed data with an expiry.
///
/// A `Token` only claims validity once a [`Mint`](crate::Mint) holding the
/// matching secret has verified it. Parsing alone proves nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    payload: Vec<u8>,
    expiry: DateTime<Utc>,
    signature: Vec<u8>,
}

impl Token {
    /// Assemble a token from raw fields without any verification.
    pub fn from_parts(payload: Vec<u8>, expiry: DateTime<Utc>, signature: Vec<u8>) -> Self {
        Self {
            payload,
            expiry,
            signature,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Serialize into the form suitable for an HTTP cookie or URL.
    pub fn serialize(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            encode(&self.payload),
            format_timestamp(self.expiry),
            encode(&self.signature),
            sep = SEPARATOR
        )
    }

    /// Parse the serialized form.
    ///
    /// Success means the string is well formed, NOT that the token is valid.
    /// Use [`Mint::verify_string`](crate::Mint::verify_string) for that.
    pub fn deserialize(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        let [data, expiry, signature] = parts.as_slice() else {
            return Err(TokenError::Format { parts: parts.len() });
        };

        let payload = URL_SAFE_NO_PAD
            .decode(data)
            .map_err(TokenError::DataDecode)?;
        let expiry = parse_timestamp(expiry)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(TokenError::SignatureDecode)?;

        Ok(Self {
            payload,
            expiry,
            signature,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for Token {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self> {
        Self::deserialize(s)
    }
}

/// Whether `expiry` can be written as a fixed-width 14-digit timestamp.
pub(crate) fn is_representable(expiry: DateTime<Utc>) -> bool {
    (0..=9999).contains(&expiry.year())
}

fn format_timestamp(expiry: DateTime<Utc>) -> String {
    expiry.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if s.len() != TIMESTAMP_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenError::ExpiryParse(format!(
            "expected {} digits, got '{}'",
            TIMESTAMP_LEN, s
        )));
    }

    // All ASCII digits, so every slice boundary is a char boundary.
    let field = |range: std::ops::Range<usize>| -> u32 {
        s[range]
            .bytes()
            .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
    };

    NaiveDate::from_ymd_opt(field(0..4) as i32, field(4..6), field(6..8))
        .and_then(|date| date.and_hms_opt(field(8..10), field(10..12), field(12..14)))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| TokenError::ExpiryParse(format!("'{}' is not a valid date/time", s)))
}
