use crate::{
    auth::AuthError,
    store::{ParseObjectIdError, StoreError},
};

/// Why a credential check failed. The messages are part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsError {
    #[error("email not found")]
    EmailNotFound,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("old password incorrect")]
    OldPasswordIncorrect,
    #[error("old password required")]
    OldPasswordRequired,
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("not valid claim detected: {0}")]
    InvalidClaim(i32),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    InvalidId(#[from] ParseObjectIdError),
    #[error("duplicate value for `{0}`")]
    Conflict(String),
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<AuthError> for UserError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Hashing(msg) => UserError::Hashing(msg),
            AuthError::InvalidClaim(code) => UserError::InvalidClaim(code),
            AuthError::Signing(msg) => UserError::Signing(msg),
            AuthError::InvalidToken => UserError::Validation("invalid or expired token".into()),
        }
    }
}

/// Lookup misses are mapped by the repository adapter, which knows the key.
impl From<StoreError> for UserError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(field) => UserError::Conflict(field),
            StoreError::Unavailable(msg) => UserError::BackendUnavailable(msg),
            StoreError::Aborted(msg) => UserError::TransactionAborted(msg),
            other => UserError::Store(other),
        }
    }
}
