//! Authentication error types

use thiserror::Error;

/// Errors raised while reading the bearer credential
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was supplied at connect time
    #[error("no authentication token provided")]
    MissingToken,

    /// The token is not a readable JWT or lacks a required claim
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    /// The token's `exp` claim is in the past
    #[error("token has expired")]
    Expired,

    /// JWT decoding error from jsonwebtoken crate
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        let err = AuthError::MissingToken;
        assert_eq!(err.to_string(), "no authentication token provided");
    }

    #[test]
    fn garbage_token_maps_to_jwt_error() {
        let err = jsonwebtoken::decode_header("not-a-jwt").unwrap_err();
        let err = AuthError::from(err);
        assert!(matches!(err, AuthError::JwtError(_)));
        assert!(err.to_string().starts_with("JWT error"));
    }

    #[test]
    fn test_auth_error_invalid_format() {
        let err = AuthError::InvalidFormat("missing sub claim".to_string());
        assert_eq!(err.to_string(), "invalid token format: missing sub claim");
    }
}
