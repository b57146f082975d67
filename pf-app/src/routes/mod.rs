pub mod health;
pub mod tools;

use crate::http_auth;
use axum::Router;

/// Health is public; everything under the tool surface requires a trusted identity.
pub fn router() -> Router {
    Router::new().merge(health::router()).merge(
        tools::router().layer(axum::middleware::from_fn(
            http_auth::require_trusted_identity,
        )),
    )
}
