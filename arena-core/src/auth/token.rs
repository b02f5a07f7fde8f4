//! Bearer token parsing and identity extraction

use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Username of a room participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form shown to users (`alice@example.com` -> `alice`)
    pub fn display_name(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for Identity {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Claims read from the platform's JWT
#[derive(Debug, Deserialize)]
struct ArenaClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Bearer credential captured at connect time
///
/// The signature is not checked here; the broker and the REST API do that.
/// This type only reads who we are and whether the token is still usable.
#[derive(Clone)]
pub struct BearerToken {
    raw: String,
    identity: Identity,
    expires_at: Option<DateTime<Utc>>,
}

impl BearerToken {
    /// Parse a raw JWT string
    pub fn parse(raw: impl Into<String>) -> Result<Self, AuthError> {
        let raw = raw.into();
        let raw = raw.trim().trim_start_matches("Bearer ").trim().to_string();
        if raw.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<ArenaClaims>(&raw, &DecodingKey::from_secret(&[]), &validation)?;
        let claims = data.claims;

        let sub = claims
            .sub
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AuthError::InvalidFormat("missing sub claim".to_string()))?;
        let expires_at = claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0));

        Ok(Self {
            raw,
            identity: Identity::new(sub),
            expires_at,
        })
    }

    /// Parse an optional token, mapping `None` to [`AuthError::MissingToken`]
    pub fn from_optional(raw: Option<String>) -> Result<Self, AuthError> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Err(AuthError::MissingToken),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Fail with [`AuthError::Expired`] when the token can no longer be used
    pub fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<(), AuthError> {
        if self.is_expired_at(now) {
            return Err(AuthError::Expired);
        }
        Ok(())
    }

    /// Value for an `Authorization` header
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.raw)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("identity", &self.identity)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    /// Sign a token for `sub` that expires `ttl_secs` from now (negative = already expired)
    pub fn token_for(sub: &str, ttl_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + ttl_secs;
        encode(
            &Header::default(),
            &json!({ "sub": sub, "exp": exp, "roles": ["USER"] }),
            &EncodingKey::from_secret(b"arena-test-secret"),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_tokens::token_for;
    use super::*;

    #[test]
    fn parse_reads_identity_from_sub() {
        let token = BearerToken::parse(token_for("alice@example.com", 3600)).unwrap();
        assert_eq!(token.identity().as_str(), "alice@example.com");
        assert_eq!(token.identity().display_name(), "alice");
        assert!(token.expires_at().is_some());
    }

    #[test]
    fn parse_accepts_bearer_prefix() {
        let raw = format!("Bearer {}", token_for("bob", 3600));
        let token = BearerToken::parse(raw).unwrap();
        assert_eq!(token.identity().as_str(), "bob");
        assert!(token.authorization().starts_with("Bearer ey"));
    }

    #[test]
    fn parse_empty_is_missing_token() {
        assert!(matches!(BearerToken::parse("  "), Err(AuthError::MissingToken)));
        assert!(matches!(
            BearerToken::from_optional(None),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn parse_garbage_is_jwt_error() {
        assert!(matches!(
            BearerToken::parse("not-a-jwt"),
            Err(AuthError::JwtError(_))
        ));
    }

    #[test]
    fn expired_token_fails_freshness_check() {
        let token = BearerToken::parse(token_for("alice", -60)).unwrap();
        assert!(token.is_expired_at(Utc::now()));
        assert!(matches!(
            token.ensure_fresh(Utc::now()),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn fresh_token_passes_freshness_check() {
        let token = BearerToken::parse(token_for("alice", 600)).unwrap();
        assert!(token.ensure_fresh(Utc::now()).is_ok());
    }

    #[test]
    fn debug_output_does_not_leak_raw_token() {
        let raw = token_for("alice", 600);
        let token = BearerToken::parse(raw.clone()).unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains(&raw));
        assert!(debug.contains("alice"));
    }
}
