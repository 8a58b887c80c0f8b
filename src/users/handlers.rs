use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::extractors::{AuthUser, RequireAdmin},
    error::AppError,
    extract::Json,
    state::AppState,
    users::dto::{
        CreateUserRequest, CreationResponse, LoginRequest, LoginResponse, UpdateUserRequest,
        UserResponse,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/login", post(login))
        .route("/users", post(create).get(get_all))
        .route("/users/claims", get(get_claims))
        .route("/users/email/:email", get(get_by_email))
        .route(
            "/users/atomic-transaction-proof",
            post(atomic_transaction_proof),
        )
        .route("/users/:id", get(get_by_id).patch(update).delete(delete))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.normalize();
    let outcome = state.users.login(payload).await?;
    Ok(Json(LoginResponse {
        user: outcome.user.into(),
        token: outcome.token,
    }))
}

/// Open sign-up. Granting claims takes an admin token, except for the very
/// first user stored.
#[instrument(skip(state, caller, payload))]
pub async fn create(
    State(state): State<AppState>,
    caller: Option<AuthUser>,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreationResponse>), AppError> {
    payload.normalize()?;
    let granted_by_admin = caller.as_ref().is_some_and(AuthUser::is_admin);
    if !payload.claims.is_empty() && !granted_by_admin && state.users.has_users().await? {
        warn!(claims = ?payload.claims, "claim grant without admin token");
        return Err(AppError::Forbidden("admin claim required to grant claims"));
    }
    let id = state.users.create(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreationResponse {
            inserted_id: id.to_string(),
        }),
    ))
}

#[instrument(skip(state, caller), fields(caller = %caller.user_id))]
pub async fn get_all(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state.users.get_all().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[instrument(skip(state, caller), fields(caller = %caller.user_id))]
pub async fn get_by_email(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let email = email.trim().to_lowercase();
    let user = state.users.get_by_email(&email).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, caller), fields(caller = %caller.user_id))]
pub async fn get_by_id(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.users.get_by_id(&id).await?;
    Ok(Json(user.into()))
}

/// Callers patch their own record; admins may patch anyone and change claims.
#[instrument(skip(state, caller, payload), fields(caller = %caller.user_id))]
pub async fn update(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(mut payload): Json<UpdateUserRequest>,
) -> Result<StatusCode, AppError> {
    payload.normalize()?;
    if !caller.is_admin() {
        if caller.user_id != id {
            warn!(target_id = %id, "update of another user without admin claim");
            return Err(AppError::Forbidden("cannot modify another user"));
        }
        if payload.claims.is_some() {
            warn!("claim change without admin claim");
            return Err(AppError::Forbidden("admin claim required to change claims"));
        }
    }
    state.users.update(&id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, admin), fields(caller = %admin.0.user_id))]
pub async fn delete(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.users.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Claim table, answered only while the backend is reachable.
#[instrument(skip(state))]
pub async fn get_claims(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<i32, &'static str>>, AppError> {
    state.users.ping().await?;
    Ok(Json(state.users.get_claims().clone()))
}

#[instrument(skip(state, admin), fields(caller = %admin.0.user_id))]
pub async fn atomic_transaction_proof(
    State(state): State<AppState>,
    admin: RequireAdmin,
) -> Result<StatusCode, AppError> {
    state.users.atomic_transaction_proof().await?;
    info!("atomic transaction proof completed");
    Ok(StatusCode::NO_CONTENT)
}
