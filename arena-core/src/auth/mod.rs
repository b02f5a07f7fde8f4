//! Bearer credential handling
//!
//! The credential is captured once when a connection is opened. The local
//! identity is the token's `sub` claim.

mod error;
mod token;

pub use error::AuthError;
pub use token::{BearerToken, Identity};

#[cfg(test)]
pub(crate) use token::test_tokens;
