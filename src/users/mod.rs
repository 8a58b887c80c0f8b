use crate::state::AppState;
use axum::Router;

pub mod dto;
mod error;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use error::{CredentialsError, UserError};
pub use repo_types::User;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
