//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Password login and signup live at the root, the Google provider routes
//! are nested under the adapter prefix, and the home page sits behind the
//! login guard.

pub mod auth;
pub mod google;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let prefix = state.google.prefix().to_owned();

    let home = Router::new()
        .route("/", get(auth::page))
        .route_layer(middleware::from_fn_with_state(state.clone(), google::require_login));

    Router::new()
        .route("/login", get(auth::page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/sign-up", get(auth::page).post(auth::sign_up))
        .route("/verify", post(auth::verify))
        .route("/validate", post(auth::validate))
        .route("/api/auth/me", get(auth::page))
        .route("/healthz", get(healthz))
        .merge(home)
        .nest(&prefix, google::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
