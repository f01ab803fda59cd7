use crate::state::AppState;
use axum::Router;

pub mod activation;
pub mod cache;
mod dto;
pub mod events;
pub(crate) mod extractors;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod session;

pub fn public_router() -> Router<AppState> {
    handlers::public_routes()
}

pub fn internal_router() -> Router<AppState> {
    handlers::internal_routes()
}
