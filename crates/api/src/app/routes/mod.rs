use axum::Router;

pub mod accounts;
pub mod system;

/// Router for internal (service-to-service) endpoints.
pub fn router() -> Router {
    Router::new().nest("/internal/accounts", accounts::router())
}
