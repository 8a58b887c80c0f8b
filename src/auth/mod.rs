pub mod claims;
pub(crate) mod extractors;
pub mod jwt;
pub mod password;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("not valid claim detected: {0}")]
    InvalidClaim(i32),
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("invalid or expired token")]
    InvalidToken,
}
