//! Signing and verification of tokens

use std::fmt;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::clock::{Clock, SystemClock};
use crate::codec::{self, Token};
use crate::entropy::{random_bytes, EntropySource, OsEntropy};
use crate::error::{Result, TokenError};
use crate::secret::{Secret, SecretCell, SecretState};

type HmacSha256 = Hmac<Sha256>;

/// Creates and verifies [`Token`]s.
///
/// Any two mints holding the same secret produce identical tokens for the same
/// data and expiry. A mint built with [`Mint::lazy`] generates a random secret
/// the first time it signs or verifies, and keeps it for its lifetime.
///
/// `Mint` is `Send + Sync`; share it behind an `Arc` or a reference.
pub struct Mint {
    secret: SecretCell,
    clock: Box<dyn Clock>,
    entropy: Box<dyn EntropySource>,
}

impl Mint {
    /// Create a mint with a predictable secret
    pub fn new(secret: impl Into<Secret>) -> Self {
        Self::with_cell(SecretCell::with_secret(secret.into()))
    }

    /// Create a zero-config mint whose secret is generated on first use
    pub fn lazy() -> Self {
        Self::with_cell(SecretCell::empty())
    }

    fn with_cell(secret: SecretCell) -> Self {
        Self {
            secret,
            clock: Box::new(SystemClock),
            entropy: Box::new(OsEntropy),
        }
    }

    /// Use a different time source for expiry checks
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Use a different random source for generated secrets and payloads
    pub fn with_entropy(mut self, entropy: impl EntropySource + 'static) -> Self {
        self.entropy = Box::new(entropy);
        self
    }

    pub fn secret_state(&self) -> SecretState {
        self.secret.state()
    }

    /// Sign `payload` into a token expiring at `expiry`.
    ///
    /// The expiry is truncated to whole seconds, the granularity of the wire form.
    pub fn sign(&self, payload: &[u8], expiry: DateTime<Utc>) -> Result<Token> {
        let expiry = expiry.trunc_subsecs(0);
        if !codec::is_representable(expiry) {
            return Err(TokenError::ExpiryOutOfRange(expiry.timestamp()));
        }

        let signature = self.signature(payload, expiry)?;
        Ok(Token::from_parts(payload.to_vec(), expiry, signature))
    }

    /// Sign `payload` into a token valid for `ttl` from now
    pub fn sign_for(&self, payload: &[u8], ttl: Duration) -> Result<Token> {
        let expiry = self.expiry_after(ttl)?;
        self.sign(payload, expiry)
    }

    /// Sign a token whose payload is `len` cryptographically random bytes.
    ///
    /// A `len` of zero yields an empty payload.
    pub fn generate(&self, len: usize, expiry: DateTime<Utc>) -> Result<Token> {
        let payload = random_bytes(self.entropy.as_ref(), len)?;
        self.sign(&payload, expiry)
    }

    /// Sign `len` random bytes into a token valid for `ttl` from now
    pub fn generate_for(&self, len: usize, ttl: Duration) -> Result<Token> {
        let expiry = self.expiry_after(ttl)?;
        self.generate(len, expiry)
    }

    /// Check a token's expiry and signature against the current time.
    ///
    /// An expired token is rejected before its signature is looked at, so an
    /// expired forgery and an expired genuine token are indistinguishable.
    pub fn verify(&self, token: Token) -> Result<Token> {
        self.verify_at(token, self.clock.now())
    }

    /// Check a token as if the current time were `now`
    pub fn verify_at(&self, token: Token, now: DateTime<Utc>) -> Result<Token> {
        if now > token.expiry() {
            return Err(TokenError::Expired);
        }

        let expected = self.signature(token.payload(), token.expiry())?;
        if !bool::from(token.signature().ct_eq(expected.as_slice())) {
            return Err(TokenError::SignatureInvalid);
        }

        Ok(token)
    }

    /// Parse a serialized token and verify it. See [`Mint::verify`].
    pub fn verify_string(&self, s: &str) -> Result<Token> {
        let token = Token::deserialize(s)?;
        self.verify(token)
    }

    fn expiry_after(&self, ttl: Duration) -> Result<DateTime<Utc>> {
        self.clock
            .now()
            .checked_add_signed(ttl)
            .ok_or(TokenError::ExpiryOutOfRange(i64::MAX))
    }

    /// HMAC-SHA256 over `payload || be64(unix_seconds(expiry))`
    fn signature(&self, payload: &[u8], expiry: DateTime<Utc>) -> Result<Vec<u8>> {
        let secret = self.secret.get_or_generate(self.entropy.as_ref())?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| TokenError::Primitive(e.to_string()))?;
        mac.update(payload);
        mac.update(&expiry.timestamp().to_be_bytes());

        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl Default for Mint {
    fn default() -> Self {
        Self::lazy()
    }
}

impl fmt::Debug for Mint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mint")
            .field("secret", &self.secret.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    const TEST_SECRET: &[u8] = b"test_secret_key_1234567890";

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 15, 12, 0, 0).unwrap()
    }

    struct BrokenEntropy;

    impl EntropySource for BrokenEntropy {
        fn fill(&self, _buf: &mut [u8]) -> Result<()> {
            Err(TokenError::RandomSource("no entropy".to_string()))
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let mint = Mint::new(TEST_SECRET.to_vec());
        let expiry = Utc::now() + Duration::hours(1);

        let token = mint.sign(b"payload", expiry).unwrap();
        assert_eq!(token.signature().len(), 32);

        let verified = mint.verify(token.clone()).unwrap();
        assert_eq!(verified, token);
        assert_eq!(verified.payload(), b"payload");
    }

    #[test]
    fn test_generate_many_lengths() {
        let mint = Mint::lazy();
        let expiry = Utc::now() + Duration::seconds(30);

        for len in (10..1000).step_by(10) {
            let token = mint.generate(len, expiry).unwrap();
            assert_eq!(token.payload().len(), len);

            let s = token.to_string();
            let verified = mint.verify_string(&s).unwrap();
            assert!(s.starts_with(&codec::encode(verified.payload())));
        }
    }

    #[test]
    fn test_generate_zero_length() {
        let mint = Mint::lazy();
        let token = mint.generate(0, Utc::now() + Duration::hours(1)).unwrap();
        assert!(token.payload().is_empty());
        assert!(mint.verify_string(&token.to_string()).is_ok());
    }

    #[test]
    fn test_altered_expiry_detected() {
        let mint = Mint::lazy();
        let token = mint.generate(20, Utc::now() + Duration::hours(1)).unwrap();

        for shift in [1, -1, 3600] {
            let tampered = Token::from_parts(
                token.payload().to_vec(),
                token.expiry() + Duration::seconds(shift),
                token.signature().to_vec(),
            );
            assert!(matches!(
                mint.verify(tampered),
                Err(TokenError::SignatureInvalid)
            ));
        }
    }

    #[test]
    fn test_altered_payload_detected() {
        let mint = Mint::lazy();
        let token = mint.generate(20, Utc::now() + Duration::hours(1)).unwrap();

        let dropped = Token::from_parts(
            token.payload()[1..].to_vec(),
            token.expiry(),
            token.signature().to_vec(),
        );
        assert!(matches!(
            mint.verify(dropped),
            Err(TokenError::SignatureInvalid)
        ));

        for i in 0..token.payload().len() {
            let mut payload = token.payload().to_vec();
            payload[i] ^= 0x01;
            let flipped = Token::from_parts(payload, token.expiry(), token.signature().to_vec());
            assert!(matches!(
                mint.verify(flipped),
                Err(TokenError::SignatureInvalid)
            ));
        }
    }

    #[test]
    fn test_altered_signature_detected() {
        let mint = Mint::new(TEST_SECRET.to_vec());
        let token = mint.sign(b"abc", Utc::now() + Duration::hours(1)).unwrap();

        let mut signature = token.signature().to_vec();
        signature[31] ^= 0x80;
        let tampered = Token::from_parts(token.payload().to_vec(), token.expiry(), signature);
        assert!(matches!(
            mint.verify(tampered),
            Err(TokenError::SignatureInvalid)
        ));

        let truncated = Token::from_parts(
            token.payload().to_vec(),
            token.expiry(),
            token.signature()[..16].to_vec(),
        );
        assert!(matches!(
            mint.verify(truncated),
            Err(TokenError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_other_secret_rejected() {
        let minter = Mint::new(b"one".to_vec());
        let checker = Mint::new(b"two".to_vec());
        let token = minter.sign(b"abc", Utc::now() + Duration::hours(1)).unwrap();

        assert!(matches!(
            checker.verify(token),
            Err(TokenError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_expired_token() {
        let mint = Mint::lazy();

        let token = mint.generate(20, Utc::now() + Duration::seconds(5)).unwrap();
        assert!(mint.verify(token).is_ok());

        let token = mint.generate(20, Utc::now() - Duration::seconds(1)).unwrap();
        assert!(matches!(mint.verify(token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_expiry_checked_before_signature() {
        let mint = Mint::new(TEST_SECRET.to_vec());
        let past = Utc::now() - Duration::hours(1);

        let forged = Token::from_parts(b"abc".to_vec(), past, vec![0u8; 32]);
        assert!(matches!(mint.verify(forged), Err(TokenError::Expired)));

        let genuine = mint.sign(b"abc", past).unwrap();
        assert!(matches!(mint.verify(genuine), Err(TokenError::Expired)));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let mint = Mint::new(TEST_SECRET.to_vec());
        let token = mint.sign(b"abc", instant()).unwrap();

        assert!(mint.verify_at(token.clone(), instant()).is_ok());
        assert!(matches!(
            mint.verify_at(token, instant() + Duration::seconds(1)),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_simulated_clock_scenario() {
        let clock = Arc::new(FixedClock::new(instant() - Duration::minutes(5)));
        let mint = Mint::new(b"k".to_vec()).with_clock(clock.clone());

        let s = mint.sign(b"abc", instant()).unwrap().to_string();
        let parts: Vec<&str> = s.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "YWJj");
        assert_eq!(parts[1], "20300615120000");

        assert_eq!(mint.verify_string(&s).unwrap().payload(), b"abc");

        clock.set(instant() + Duration::seconds(1));
        assert!(matches!(mint.verify_string(&s), Err(TokenError::Expired)));
    }

    #[test]
    fn test_sign_for_uses_clock() {
        let clock = Arc::new(FixedClock::new(instant()));
        let mint = Mint::new(TEST_SECRET.to_vec()).with_clock(clock.clone());

        let token = mint.sign_for(b"abc", Duration::minutes(10)).unwrap();
        assert_eq!(token.expiry(), instant() + Duration::minutes(10));

        clock.set(instant() + Duration::minutes(11));
        assert!(matches!(mint.verify(token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_generate_for_uses_clock() {
        let clock = Arc::new(FixedClock::new(instant()));
        let mint = Mint::lazy().with_clock(clock.clone());

        let token = mint.generate_for(16, Duration::seconds(30)).unwrap();
        assert_eq!(token.payload().len(), 16);
        assert_eq!(token.expiry(), instant() + Duration::seconds(30));
        assert!(mint.verify(token.clone()).is_ok());

        clock.set(instant() + Duration::seconds(31));
        assert!(matches!(mint.verify(token), Err(TokenError::Expired)));

        assert!(matches!(
            mint.generate_for(16, Duration::MAX),
            Err(TokenError::ExpiryOutOfRange(_))
        ));
    }

    #[test]
    fn test_sign_for_huge_ttl() {
        let mint = Mint::new(TEST_SECRET.to_vec());
        assert!(matches!(
            mint.sign_for(b"abc", Duration::days(365 * 9000)),
            Err(TokenError::ExpiryOutOfRange(_))
        ));
        assert!(matches!(
            mint.sign_for(b"abc", Duration::MAX),
            Err(TokenError::ExpiryOutOfRange(_))
        ));
    }

    #[test]
    fn test_deterministic_signatures() {
        let a = Mint::new(TEST_SECRET.to_vec());
        let b = Mint::new(TEST_SECRET.to_vec());

        let ta = a.sign(b"same", instant()).unwrap();
        let tb = b.sign(b"same", instant()).unwrap();
        assert_eq!(ta.signature(), tb.signature());
        assert_eq!(ta.to_string(), tb.to_string());
    }

    #[test]
    fn test_signature_matches_reference_mac() {
        let mint = Mint::new(b"k".to_vec());
        let token = mint.sign(b"abc", instant()).unwrap();

        let mut mac = HmacSha256::new_from_slice(b"k").unwrap();
        mac.update(b"abc");
        mac.update(&(instant().timestamp() as u64).to_be_bytes());
        let expected = mac.finalize().into_bytes();

        assert_eq!(token.signature(), expected.as_slice());
    }

    #[test]
    fn test_subsecond_expiry_truncated() {
        let mint = Mint::new(TEST_SECRET.to_vec());
        let expiry = instant() + Duration::milliseconds(750);

        let token = mint.sign(b"abc", expiry).unwrap();
        assert_eq!(token.expiry(), instant());

        let parsed = Token::deserialize(&token.to_string()).unwrap();
        assert_eq!(parsed, token);
        assert!(mint.verify_at(parsed, instant()).is_ok());
    }

    #[test]
    fn test_expiry_out_of_range() {
        let mint = Mint::new(TEST_SECRET.to_vec());
        let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();

        assert!(matches!(
            mint.sign(b"abc", far),
            Err(TokenError::ExpiryOutOfRange(_))
        ));
    }

    #[test]
    fn test_verify_string_propagates_parse_errors() {
        let mint = Mint::new(TEST_SECRET.to_vec());

        assert!(matches!(
            mint.verify_string("only.two"),
            Err(TokenError::Format { parts: 2 })
        ));
        assert!(matches!(
            mint.verify_string("***.20300615120000.AAAA"),
            Err(TokenError::DataDecode(_))
        ));
        assert!(matches!(
            mint.verify_string("YWJj.2030.AAAA"),
            Err(TokenError::ExpiryParse(_))
        ));
        assert!(matches!(
            mint.verify_string("YWJj.20300615120000.***"),
            Err(TokenError::SignatureDecode(_))
        ));
    }

    #[test]
    fn test_random_source_failure_is_returned() {
        let mint = Mint::lazy().with_entropy(BrokenEntropy);

        let err = mint.sign(b"abc", instant()).unwrap_err();
        assert!(matches!(err, TokenError::RandomSource(_)));
        assert_eq!(mint.secret_state(), SecretState::Unset);

        let err = mint.generate(8, instant()).unwrap_err();
        assert!(matches!(err, TokenError::RandomSource(_)));
    }

    #[test]
    fn test_explicit_secret_never_draws_entropy() {
        let mint = Mint::new(TEST_SECRET.to_vec()).with_entropy(BrokenEntropy);
        assert_eq!(mint.secret_state(), SecretState::Set);
        assert!(mint.sign(b"abc", instant()).is_ok());
    }

    #[test]
    fn test_lazy_state_transitions() {
        let mint = Mint::default();
        assert_eq!(mint.secret_state(), SecretState::Unset);

        mint.sign(b"abc", instant()).unwrap();
        assert_eq!(mint.secret_state(), SecretState::Set);
        assert!(format!("{:?}", mint).contains("Set"));
    }

    #[test]
    fn test_empty_secret_is_usable() {
        let mint = Mint::new(Vec::<u8>::new());
        let token = mint.sign(b"abc", instant()).unwrap();
        assert!(mint.verify_at(token, instant()).is_ok());
    }
}
