//! Google provider routes and the axum middleware around the login guards.
//!
//! SYSTEM CONTEXT
//! ==============
//! Mounted under the adapter prefix (`/dance_google_auth` by default). The
//! guard middleware runs in front of protected routes, loads the caller's
//! session, asks [`GoogleAuth`] for a verdict and persists whatever the
//! guard captured before answering.

use axum::Router;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;

use super::auth::ClientSession;
use crate::services::google::{AccessPredicate, Guard, GuardResponse, Outcome};
use crate::services::session::generate_token;
use crate::state::AppState;

const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";

/// Provider routes, to be nested under the adapter prefix.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/verify", get(verify))
        .route("/signin", get(signin))
        .route("/signout", get(signout))
}

fn go_back(state: &AppState) -> String {
    format!("<a href=\"{}\">Go Back</a>", state.google.return_endpoint())
}

fn oauth_state_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::minutes(10))
        .build()
}

fn clear_oauth_state_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

// =============================================================================
// PROVIDER ROUTES
// =============================================================================

/// `GET {prefix}/login` — redirect to Google with a CSRF state cookie.
pub async fn login(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(config) = state.google.config() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Google OAuth not configured").into_response();
    };

    let oauth_state = generate_token();
    let url = config.authorize_url(&oauth_state);
    let jar = jar.add(oauth_state_cookie(oauth_state, state.config.cookie_secure));
    (jar, Redirect::temporary(&url)).into_response()
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// `GET {prefix}/verify` — OAuth callback.
pub async fn verify(
    State(state): State<AppState>,
    jar: CookieJar,
    mut client: ClientSession,
    Query(params): Query<CallbackQuery>,
) -> Response {
    let Some(config) = state.google.config() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Google OAuth not configured").into_response();
    };
    let secure = state.config.cookie_secure;

    // Verify OAuth CSRF state from cookie.
    let Some(callback_state) = params.state.as_deref() else {
        return (StatusCode::BAD_REQUEST, "missing oauth state").into_response();
    };
    let expected_state = jar
        .get(OAUTH_STATE_COOKIE_NAME)
        .map(Cookie::value)
        .unwrap_or_default();
    if expected_state.is_empty() || expected_state != callback_state {
        return (StatusCode::UNAUTHORIZED, "invalid oauth state").into_response();
    }
    let Some(code) = params.code.as_deref() else {
        return login_failed(jar, secure);
    };

    let response = match state.google.exchange_code(config, code).await {
        Ok(token) => state.google.fetch_userinfo(&token).await,
        Err(e) => Err(e),
    };
    let outcome = response.and_then(|resp| state.google.handle_callback(&mut client.session, &resp));

    match outcome {
        Ok(Outcome::Redirect(target)) => {
            let jar = client.commit(&state, jar).await.add(clear_oauth_state_cookie(secure));
            (jar, Redirect::to(&target)).into_response()
        }
        Ok(Outcome::Denied) => {
            let back = go_back(&state);
            let jar = client.commit(&state, jar).await.add(clear_oauth_state_cookie(secure));
            let body = format!("Your Google account has no permission to login. {back}");
            (StatusCode::FORBIDDEN, jar, Html(body)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "google login failed");
            login_failed(jar, secure)
        }
    }
}

/// Failed callback: 502, and the single-use state cookie is cleared.
fn login_failed(jar: CookieJar, secure: bool) -> Response {
    let jar = jar.add(clear_oauth_state_cookie(secure));
    (StatusCode::BAD_GATEWAY, jar, "Google Login Fail").into_response()
}

/// `GET {prefix}/signin`
pub async fn signin(State(state): State<AppState>, client: ClientSession) -> Response {
    if client.session.is_authenticated() {
        return Html(format!("You are already signed in. {}", go_back(&state))).into_response();
    }
    Redirect::to(&state.google.login_url()).into_response()
}

/// `GET {prefix}/signout` — drop the session and its cookie.
pub async fn signout(State(state): State<AppState>, jar: CookieJar, client: ClientSession) -> Response {
    let back = go_back(&state);
    if !client.session.is_authenticated() {
        return Html(format!("You are not signed in yet. {back}")).into_response();
    }
    let jar = client.destroy(&state, jar).await;
    (jar, Html(format!("SignOut Success. {back}"))).into_response()
}

// =============================================================================
// GUARD MIDDLEWARE
// =============================================================================

impl IntoResponse for GuardResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Login(url) => Redirect::to(&url).into_response(),
            Self::NoPermission { signout_url } => (
                StatusCode::FORBIDDEN,
                Html(format!("No Permission. <a href=\"{signout_url}\">SignOut</a>")),
            )
                .into_response(),
        }
    }
}

fn request_url(req: &Request) -> String {
    req.uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_owned(), |pq| pq.as_str().to_owned())
}

async fn finish(guard: Guard, client: ClientSession, state: &AppState, jar: CookieJar, req: Request, next: Next) -> Response {
    match guard {
        Guard::Proceed => next.run(req).await,
        Guard::Respond(resp) => {
            let jar = client.commit(state, jar).await;
            (jar, resp).into_response()
        }
    }
}

/// Middleware: anonymous requests go through the Google login.
pub async fn require_login(State(state): State<AppState>, jar: CookieJar, req: Request, next: Next) -> Response {
    let mut client = ClientSession::load(&state, &jar).await;
    let url = request_url(&req);
    let guard = state.google.login_required(&mut client.session, req.uri().path(), &url);
    finish(guard, client, &state, jar, req, next).await
}

/// State for [`require_auth`]: the app plus the access predicate.
#[derive(Clone)]
pub struct AuthGate {
    pub state: AppState,
    pub predicate: AccessPredicate,
}

/// Middleware: logged in and accepted by the gate's predicate.
pub async fn require_auth(State(gate): State<AuthGate>, jar: CookieJar, req: Request, next: Next) -> Response {
    let state = &gate.state;
    let mut client = ClientSession::load(state, &jar).await;
    let url = request_url(&req);
    let guard = state
        .google
        .auth_required(&mut client.session, req.uri().path(), &url, gate.predicate.as_ref());
    finish(guard, client, state, jar, req, next).await
}

/// Put every route of `router` behind [`require_login`].
pub fn protect_all_login(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state.clone(), require_login))
}

/// Put every route of `router` behind [`require_auth`] with `predicate`.
pub fn protect_all_auth(router: Router<AppState>, state: &AppState, predicate: AccessPredicate) -> Router<AppState> {
    let gate = AuthGate { state: state.clone(), predicate };
    router.layer(middleware::from_fn_with_state(gate, require_auth))
}

#[cfg(test)]
#[path = "google_test.rs"]
mod tests;
