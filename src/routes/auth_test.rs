use std::sync::Arc;

use axum::http::header;

use super::*;
use crate::config::AppConfig;
use crate::routes::app;
use crate::services::credentials::{CredentialStore, MemoryCredentialStore, hash_password};
use crate::services::google::GoogleAuth;
use crate::services::otp::ValidationError;
use crate::state::test_helpers::*;

async fn with_jo(test: &TestApp) {
    test.store
        .create_user("a@b.com", "Jo", &hash_password("abcdefg").unwrap())
        .await
        .unwrap();
}

// =============================================================================
// error mapping
// =============================================================================

#[test]
fn signup_errors_map_to_statuses() {
    let cases = [
        (SignupError::Validation(ValidationError::PasswordMismatch), StatusCode::UNPROCESSABLE_ENTITY),
        (SignupError::Credential(CredentialError::DuplicateEmail), StatusCode::CONFLICT),
        (SignupError::Verification(VerificationError::UnknownHandle), StatusCode::NOT_FOUND),
        (SignupError::Verification(VerificationError::CodeMismatch), StatusCode::BAD_REQUEST),
        (SignupError::Verification(VerificationError::InvalidCode), StatusCode::BAD_REQUEST),
        (
            SignupError::Mail(crate::services::mail::MailError::Delivery("down".into())),
            StatusCode::BAD_GATEWAY,
        ),
        (SignupError::Credential(CredentialError::Hash("boom".into())), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
        assert_eq!(signup_error_to_status(&err), status, "{err}");
    }
}

// =============================================================================
// session cookie
// =============================================================================

#[test]
fn session_cookie_attributes() {
    let cookie = session_cookie("tok".into(), false);
    assert_eq!(cookie.name(), COOKIE_NAME);
    assert_eq!(cookie.value(), "tok");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.secure(), Some(false));
    assert_eq!(cookie.max_age(), Some(AUTHENTICATED_TTL));
    assert_eq!(session_cookie("tok".into(), true).secure(), Some(true));
}

#[test]
fn expired_cookie_has_zero_max_age() {
    let cookie = expired_session_cookie(false);
    assert_eq!(cookie.value(), "");
    assert_eq!(cookie.max_age(), Some(Duration::ZERO));
}

#[tokio::test]
async fn unknown_token_gets_fresh_session() {
    let test = test_app();
    let jar = CookieJar::new().add(Cookie::new(COOKIE_NAME, "forged"));
    let client = ClientSession::load(&test.state, &jar).await;
    assert_ne!(client.token, "forged");
    assert_eq!(client.token.len(), 64);
    assert_eq!(client.session, Session::default());
}

#[tokio::test]
async fn known_token_loads_stored_session() {
    let test = test_app();
    let mut session = Session::default();
    session.flash(Flash::success("hi"));
    test.state.sessions.save("tok", session.clone()).await;

    let jar = CookieJar::new().add(Cookie::new(COOKIE_NAME, "tok"));
    let client = ClientSession::load(&test.state, &jar).await;
    assert_eq!(client.token, "tok");
    assert_eq!(client.session, session);
}

// =============================================================================
// login / logout
// =============================================================================

#[tokio::test]
async fn login_unknown_email() {
    let router = app(test_app().state);
    let resp = send(&router, post_form("/login", &[("email", "x@y.com"), ("password", "abcdefg")], None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["category"], "error");
    assert_eq!(body["message"], "Email does not exist.");
    assert!(body.get("field").is_none());
}

#[tokio::test]
async fn login_wrong_password() {
    let test = test_app();
    with_jo(&test).await;
    let router = app(test.state);
    let resp = send(&router, post_form("/login", &[("email", "a@b.com"), ("password", "wrong!!")], None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["message"], "Incorrect password, try again.");
}

#[tokio::test]
async fn login_is_case_sensitive_on_email() {
    let test = test_app();
    with_jo(&test).await;
    let router = app(test.state);
    let resp = send(&router, post_form("/login", &[("email", "A@B.com"), ("password", "abcdefg")], None)).await;
    assert_eq!(body_json(resp).await["message"], "Email does not exist.");
}

#[tokio::test]
async fn login_keeps_the_session_token() {
    let test = test_app();
    with_jo(&test).await;
    let router = app(test.state.clone());

    // A captured redirect gives the anonymous caller a stored session.
    let first = send(&router, get("/", None)).await;
    let token = set_cookie(&first, "session_token").unwrap();
    let resp = send(&router, post_form("/login", &[("email", "a@b.com"), ("password", "abcdefg")], Some(&token))).await;
    assert_eq!(set_cookie(&resp, "session_token").as_deref(), Some(token.as_str()));
    assert!(test.state.sessions.load(&token).await.unwrap().is_authenticated());
}

#[tokio::test]
async fn anonymous_logout_redirects_to_login_with_flash() {
    let router = app(test_app().state);
    let resp = send(&router, get("/logout", None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp).as_deref(), Some("/login"));
    let token = set_cookie(&resp, "session_token").unwrap();

    let page = body_json(send(&router, get("/login", Some(&token))).await).await;
    assert_eq!(page["authenticated"], false);
    assert_eq!(page["flashes"][0]["category"], "error");
    assert_eq!(page["flashes"][0]["message"], "Please log in to access this page.");
}

#[tokio::test]
async fn commit_drops_empty_session() {
    let test = test_app();
    let mut session = Session::default();
    session.flash(Flash::success("hi"));
    test.state.sessions.save("tok", session).await;

    let jar = CookieJar::new().add(Cookie::new(COOKIE_NAME, "tok"));
    let mut client = ClientSession::load(&test.state, &jar).await;
    client.session.take_flashes();
    let jar = client.commit(&test.state, CookieJar::new()).await;
    assert!(jar.get(COOKIE_NAME).is_none());
    assert!(test.state.sessions.load("tok").await.is_none());
}

#[tokio::test]
async fn page_reports_anonymous_session() {
    let router = app(test_app().state);
    let resp = send(&router, get("/login", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["authenticated"], false);
    assert!(body["user"].is_null());
}

// =============================================================================
// signup
// =============================================================================

#[tokio::test]
async fn sign_up_rejects_existing_email() {
    let test = test_app();
    with_jo(&test).await;
    let router = app(test.state);
    let resp = send(&router, post_form("/sign-up", &jo_form(), None)).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["message"], "Email already exists.");
    assert!(test.mailer.sent().is_empty());
}

#[tokio::test]
async fn sign_up_reports_validation_message() {
    let router = app(test_app().state);
    let form = [("email", "a@b.com"), ("firstName", "J"), ("password1", "abcdefg"), ("password2", "abcdefg")];
    let resp = send(&router, post_form("/sign-up", &form, None)).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "First name must be greater than 1 character.");
    assert_eq!(body["field"], "firstName");
}

#[tokio::test]
async fn verify_rejects_mismatched_passwords_without_mail() {
    let test = test_app();
    let router = app(test.state.clone());
    let form = [("email", "a@b.com"), ("firstName", "Jo"), ("password1", "abcdefg"), ("password2", "abcdefh")];
    let resp = send(&router, post_form("/verify", &form, None)).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(test.mailer.sent().is_empty());
    assert_eq!(test.state.otp.pending_count().await, 0);
}

#[tokio::test]
async fn verify_mail_failure_is_bad_gateway() {
    let config = AppConfig::default();
    let google = GoogleAuth::new(None, &config.google_prefix, &config.return_endpoint);
    let state = AppState::new(
        config,
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(RecordingMailer::failing()),
        google,
    );
    let router = app(state.clone());
    let resp = send(&router, post_form("/verify", &jo_form(), None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(state.otp.pending_count().await, 0);
}

#[tokio::test]
async fn verify_mails_code_with_otp_subject() {
    let test = test_app();
    let router = app(test.state);
    let resp = send(&router, post_form("/verify", &jo_form(), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let sent = test.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@b.com");
    assert_eq!(sent[0].subject, "OTP");
}

#[tokio::test]
async fn validate_unknown_handle() {
    let router = app(test_app().state);
    let resp = send(&router, post_form("/validate", &[("handle", "nope"), ("otp", "123456")], None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["message"], "Please try again...!");
}

#[tokio::test]
async fn validate_non_numeric_code() {
    let test = test_app();
    let handle = test.state.otp.issue_with_code(jo(), 456).await.unwrap();
    let router = app(test.state);
    let resp = send(&router, post_form("/validate", &[("handle", handle.as_str()), ("otp", "abc")], None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test.store.len().await, 0);
}
