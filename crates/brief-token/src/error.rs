//! Token errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TokenError>;

/// Everything that can go wrong while parsing, signing or verifying a token
#[derive(Debug, Error)]
pub enum TokenError {
    /// The serialized token did not split into exactly three fields
    #[error("Invalid token format: {parts} parts, expected 3")]
    Format { parts: usize },

    #[error("Invalid data field: {0}")]
    DataDecode(#[source] base64::DecodeError),

    #[error("Invalid expiry field: {0}")]
    ExpiryParse(String),

    #[error("Invalid signature field: {0}")]
    SignatureDecode(#[source] base64::DecodeError),

    /// Recomputed signature differs from the one carried by the token
    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Token expired")]
    Expired,

    /// The expiry cannot be written as a 14-digit timestamp
    #[error("Expiry out of range: {0}")]
    ExpiryOutOfRange(i64),

    #[error("Random source failure: {0}")]
    RandomSource(String),

    #[error("MAC primitive failure: {0}")]
    Primitive(String),
}

impl TokenError {
    /// True for failures raised while parsing the serialized form
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            TokenError::Format { .. }
                | TokenError::DataDecode(_)
                | TokenError::ExpiryParse(_)
                | TokenError::SignatureDecode(_)
        )
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired)
    }
}
