use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::{
    claims::Claim,
    jwt::{verify_token, TokenClaims},
};
use crate::{error::AppError, state::AppState};

/// Caller identified by a valid bearer token.
pub struct AuthUser {
    pub user_id: String,
    pub claims: TokenClaims,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.claims.has(Claim::Admin)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::Unauthorized("missing Authorization header"))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AppError::Unauthorized("invalid auth scheme"))?;

        let claims = verify_token(token, &state.config.jwt.secret).map_err(|_| {
            warn!("invalid or expired token");
            AppError::Unauthorized("invalid or expired token")
        })?;

        Ok(AuthUser {
            user_id: claims.user_id.clone(),
            claims,
        })
    }
}

/// Requires the `admin` claim on top of a valid token.
pub struct RequireAdmin(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            warn!(user_id = %user.user_id, "admin claim required");
            return Err(AppError::Forbidden("admin claim required"));
        }
        Ok(RequireAdmin(user))
    }
}
