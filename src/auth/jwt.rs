use std::collections::BTreeMap;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, error};

use super::{
    claims::{validate_all, Claim},
    AuthError,
};

/// Absolute token lifetime. There is no refresh.
pub const TOKEN_TTL: Duration = Duration::hours(168);

/// Signed token payload: identity, expiry, and one `true` flag per granted
/// claim keyed by the claim name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub authorized: bool,
    pub user_id: String,
    pub exp: i64,
    #[serde(flatten)]
    pub grants: BTreeMap<String, bool>,
}

impl TokenClaims {
    pub fn has(&self, claim: Claim) -> bool {
        self.grants.get(claim.name()).copied().unwrap_or(false)
    }
}

/// Sign an HS256 token for `user_id` carrying `claims`.
///
/// Claims are re-validated first so a token never embeds an unknown
/// capability.
pub fn issue_token(user_id: &str, secret: &str, claims: &[i32]) -> Result<String, AuthError> {
    validate_all(claims)?;
    if secret.is_empty() {
        return Err(AuthError::Signing("empty signing secret".into()));
    }

    let exp = OffsetDateTime::now_utc() + TOKEN_TTL;
    let grants = claims
        .iter()
        .filter_map(|&code| Claim::from_code(code))
        .map(|claim| (claim.name().to_string(), true))
        .collect();
    let payload = TokenClaims {
        authorized: true,
        user_id: user_id.to_string(),
        exp: exp.unix_timestamp(),
        grants,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &payload,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!(error = %e, "jwt encode error");
        AuthError::Signing(e.to_string())
    })?;
    debug!(user_id = %user_id, "jwt signed");
    Ok(token)
}

/// Check signature and expiry and return the payload.
pub fn verify_token(token: &str, secret: &str) -> Result<TokenClaims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        debug!(error = %e, "jwt rejected");
        AuthError::InvalidToken
    })?;
    if !data.claims.authorized {
        return Err(AuthError::InvalidToken);
    }
    Ok(data.claims)
}
