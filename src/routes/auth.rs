//! Email/password routes — login, logout, signup, OTP verification.

use std::convert::Infallible;

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::services::credentials::{self, CredentialError};
use crate::services::otp::{SignupCandidate, VerificationError};
use crate::services::session::{AUTHENTICATED_TTL, AuthMethod, Flash, Session, SessionIdentity, generate_token};
use crate::services::signup::{self, SignupError};
use crate::state::AppState;

pub(crate) const COOKIE_NAME: &str = "session_token";

const LOGIN_PATH: &str = "/login";
const VERIFY_PATH: &str = "/verify";

// =============================================================================
// SESSION EXTRACTOR
// =============================================================================

/// The caller's session, loaded from the `session_token` cookie.
///
/// Unknown or missing tokens get a fresh token and an empty session; nothing
/// is stored until [`ClientSession::commit`].
pub struct ClientSession {
    pub token: String,
    pub session: Session,
}

impl ClientSession {
    pub async fn load(state: &AppState, jar: &CookieJar) -> Self {
        if let Some(token) = jar.get(COOKIE_NAME).map(Cookie::value).filter(|t| !t.is_empty()) {
            if let Some(session) = state.sessions.load(token).await {
                return Self { token: token.to_owned(), session };
            }
        }
        Self { token: generate_token(), session: Session::default() }
    }

    /// Persist the session and attach its cookie to `jar`. A session with
    /// nothing in it is dropped instead and no cookie is set.
    pub async fn commit(self, state: &AppState, jar: CookieJar) -> CookieJar {
        if self.session.is_empty() {
            state.sessions.remove(&self.token).await;
            return jar;
        }
        state.sessions.save(&self.token, self.session).await;
        jar.add(session_cookie(self.token, state.config.cookie_secure))
    }

    /// Forget the session server-side and expire the cookie.
    pub async fn destroy(self, state: &AppState, jar: CookieJar) -> CookieJar {
        state.sessions.remove(&self.token).await;
        jar.add(expired_session_cookie(state.config.cookie_secure))
    }
}

impl<S> FromRequestParts<S> for ClientSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let app_state = AppState::from_ref(state);
        Ok(Self::load(&app_state, &jar).await)
    }
}

pub(crate) fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(AUTHENTICATED_TTL)
        .build()
}

pub(crate) fn expired_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Error body: the flash plus, for validation failures, the offending form field.
#[derive(Serialize)]
struct FlashBody {
    #[serde(flatten)]
    flash: Flash,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

fn flash_response(status: StatusCode, flash: Flash) -> Response {
    (status, Json(FlashBody { flash, field: None })).into_response()
}

fn login_error_response(err: &CredentialError) -> Response {
    match err {
        CredentialError::UserNotFound => flash_response(StatusCode::UNAUTHORIZED, Flash::error("Email does not exist.")),
        CredentialError::InvalidPassword => {
            flash_response(StatusCode::UNAUTHORIZED, Flash::error("Incorrect password, try again."))
        }
        other => {
            tracing::error!(error = %other, "login failed");
            flash_response(StatusCode::INTERNAL_SERVER_ERROR, Flash::error("Login failed, try again later."))
        }
    }
}

pub(crate) fn signup_error_to_status(err: &SignupError) -> StatusCode {
    match err {
        SignupError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SignupError::Credential(CredentialError::DuplicateEmail) => StatusCode::CONFLICT,
        SignupError::Verification(VerificationError::UnknownHandle) => StatusCode::NOT_FOUND,
        SignupError::Verification(_) => StatusCode::BAD_REQUEST,
        SignupError::Mail(_) => StatusCode::BAD_GATEWAY,
        SignupError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn signup_error_message(err: &SignupError) -> String {
    match err {
        SignupError::Validation(e) => e.to_string(),
        SignupError::Credential(CredentialError::DuplicateEmail) => "Email already exists.".to_owned(),
        SignupError::Verification(_) => "Please try again...!".to_owned(),
        SignupError::Mail(_) => "Could not send the verification email.".to_owned(),
        SignupError::Credential(_) => "Could not create the account.".to_owned(),
    }
}

fn signup_error_response(err: &SignupError) -> Response {
    let status = signup_error_to_status(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "signup failed");
    }
    let field = match err {
        SignupError::Validation(e) => Some(e.field()),
        _ => None,
    };
    (status, Json(FlashBody { flash: Flash::error(signup_error_message(err)), field })).into_response()
}

// =============================================================================
// FORMS
// =============================================================================

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct SignupForm {
    email: String,
    #[serde(rename = "firstName")]
    first_name: String,
    password1: String,
    password2: String,
}

impl From<SignupForm> for SignupCandidate {
    fn from(form: SignupForm) -> Self {
        Self {
            email: form.email,
            display_name: form.first_name,
            password: form.password1,
            password_confirmation: form.password2,
        }
    }
}

/// Extra fields the signup page may echo back are ignored; the candidate is
/// taken from the pending signup behind `handle`.
#[derive(Deserialize)]
pub struct ValidateForm {
    handle: String,
    otp: String,
}

#[derive(Serialize)]
pub struct PageBody {
    authenticated: bool,
    user: Option<SessionIdentity>,
    flashes: Vec<Flash>,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /login`, `GET /sign-up`, `GET /api/auth/me` — current user and pending flashes.
pub async fn page(State(state): State<AppState>, jar: CookieJar, mut client: ClientSession) -> Response {
    let body = PageBody {
        authenticated: client.session.is_authenticated(),
        user: client.session.identity().cloned(),
        flashes: client.session.take_flashes(),
    };
    let jar = client.commit(&state, jar).await;
    (jar, Json(body)).into_response()
}

/// `POST /login` — check the password and log the session in.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    mut client: ClientSession,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match credentials::verify_password(state.credentials.as_ref(), &form.email, &form.password).await {
        Ok(user) => user,
        Err(e) => return login_error_response(&e),
    };

    client.session.mark_authenticated(SessionIdentity {
        email: user.email,
        name: user.display_name,
        method: AuthMethod::Password,
    });
    client.session.flash(Flash::success("Logged in successfully!"));
    let target = client.session.consume_redirect(&state.config.return_endpoint);
    let jar = client.commit(&state, jar).await;
    (jar, Redirect::to(&target)).into_response()
}

/// `GET /logout` — end the login. Anonymous callers are sent to the login page with a flash.
pub async fn logout(State(state): State<AppState>, jar: CookieJar, mut client: ClientSession) -> Response {
    if client.session.is_authenticated() {
        client.session.mark_unauthenticated();
    } else {
        client.session.flash(Flash::error("Please log in to access this page."));
    }
    let jar = client.commit(&state, jar).await;
    (jar, Redirect::to(LOGIN_PATH)).into_response()
}

/// `POST /sign-up` — check the form, then forward it (method and body kept) to `/verify`.
pub async fn sign_up(State(state): State<AppState>, Form(form): Form<SignupForm>) -> Response {
    let candidate = SignupCandidate::from(form);
    match signup::check(state.credentials.as_ref(), &candidate).await {
        Ok(()) => Redirect::temporary(VERIFY_PATH).into_response(),
        Err(e) => signup_error_response(&e),
    }
}

/// `POST /verify` — check the form and mail a verification code.
pub async fn verify(State(state): State<AppState>, Form(form): Form<SignupForm>) -> Response {
    let candidate = SignupCandidate::from(form);
    match signup::begin(state.credentials.as_ref(), &state.otp, candidate).await {
        Ok(handle) => Json(serde_json::json!({ "handle": handle })).into_response(),
        Err(e) => signup_error_response(&e),
    }
}

/// `POST /validate` — confirm the code and create the account.
pub async fn validate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut client: ClientSession,
    Form(form): Form<ValidateForm>,
) -> Response {
    match signup::complete(state.credentials.as_ref(), &state.otp, &form.handle, &form.otp).await {
        Ok(_) => {
            client.session.flash(Flash::success("Account created!"));
            let jar = client.commit(&state, jar).await;
            (jar, Redirect::to(LOGIN_PATH)).into_response()
        }
        Err(e) => signup_error_response(&e),
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
