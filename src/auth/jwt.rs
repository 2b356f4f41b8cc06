use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Role;
use crate::{Error, Result};

/// Verified token payload.
///
/// Timestamps are unix milliseconds so expiry holds below one second.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token was issued to.
    pub sub: String,
    /// Role of the user at issue time.
    pub role: Role,
    /// Issue time.
    pub iat: u64,
    /// Expiry time; the token is invalid from this instant on.
    pub exp: u64,
}

/// Issues and verifies HS256 access tokens.
///
/// Tokens are stateless: verification only checks the signature and the
/// expiry embedded in the token. There is no revocation.
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_duration: Duration,
}

impl JwtManager {
    /// Creates a manager signing with `secret`. Fails on an empty secret or
    /// a zero token duration.
    pub fn new(secret: &[u8], token_duration: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::InvalidArgument("token secret is empty".to_string()));
        }
        if token_duration.is_zero() {
            return Err(Error::InvalidArgument("token duration is zero".to_string()));
        }

        // Expiry is checked with millisecond precision in `verify_at`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            token_duration,
        })
    }

    /// Lifetime of issued tokens.
    pub fn token_duration(&self) -> Duration {
        self.token_duration
    }

    /// Issues a token for `username` with `role`, valid from now.
    pub fn issue(&self, username: &str, role: Role) -> Result<String> {
        self.issue_at(username, role, SystemTime::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, username: &str, role: Role, now: SystemTime) -> Result<String> {
        let iat = unix_millis(now);
        let exp = iat.saturating_add(self.token_duration.as_millis() as u64);

        let claims = Claims {
            sub: username.to_string(),
            role,
            iat,
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("cannot sign token: {e}")))
    }

    /// Verifies `token` against the current time.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, SystemTime::now())
    }

    /// Verifies `token` as if the current time were `now`.
    ///
    /// Fails with [`Error::Unauthenticated`] if the signature does not
    /// match, the payload is malformed, or `now` is at or past the expiry.
    pub fn verify_at(&self, token: &str, now: SystemTime) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            Error::Unauthenticated("invalid access token".to_string())
        })?;

        let claims = data.claims;
        if unix_millis(now) >= claims.exp {
            return Err(Error::Unauthenticated("access token is expired".to_string()));
        }

        Ok(claims)
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
