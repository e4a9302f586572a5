use super::*;

fn config() -> GoogleConfig {
    GoogleConfig {
        client_id: "client-123".into(),
        client_secret: "shh".into(),
        redirect_uri: "http://localhost:3000/dance_google_auth/verify".into(),
    }
}

fn adapter() -> GoogleAuth {
    GoogleAuth::new(Some(config()), DEFAULT_ROUTE_PREFIX, "/")
}

fn profile_response() -> ProviderResponse {
    ProviderResponse {
        status: 200,
        body: r#"{"id":"1","email":"ravi@example.com","given_name":"Ravi","family_name":"Gaygol","picture":"x"}"#.into(),
    }
}

// =============================================================================
// GoogleConfig::from_env — env manipulation requires unsafe in edition 2024.
// =============================================================================

/// # Safety
/// Env mutation races with other tests touching the same keys.
unsafe fn clear_google_env() {
    unsafe {
        std::env::remove_var("GOOGLE_OAUTH_CLIENT_ID");
        std::env::remove_var("GOOGLE_OAUTH_CLIENT_SECRET");
        std::env::remove_var("GOOGLE_OAUTH_REDIRECT_URI");
    }
}

#[test]
fn from_env_requires_all_three() {
    unsafe {
        clear_google_env();
        std::env::set_var("GOOGLE_OAUTH_CLIENT_ID", "id");
        std::env::set_var("GOOGLE_OAUTH_CLIENT_SECRET", "secret");
    }
    assert!(GoogleConfig::from_env().is_none());
    unsafe { std::env::set_var("GOOGLE_OAUTH_REDIRECT_URI", "http://localhost/cb") };
    let config = GoogleConfig::from_env().unwrap();
    assert_eq!(config.client_id, "id");
    assert_eq!(config.redirect_uri, "http://localhost/cb");
    unsafe { clear_google_env() };
}

// =============================================================================
// authorize_url
// =============================================================================

#[test]
fn authorize_url_targets_google() {
    let url = config().authorize_url("st");
    assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(url.contains("client_id=client-123"));
    assert!(url.contains("response_type=code"));
}

#[test]
fn authorize_url_encodes_redirect_scope_and_state() {
    let url = config().authorize_url("a b");
    assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fdance_google_auth%2Fverify"));
    assert!(url.contains("scope=profile%20email"));
    assert!(url.contains("state=a%20b"));
}

// =============================================================================
// profile / response
// =============================================================================

#[test]
fn display_name_is_family_then_given() {
    let profile = GoogleProfile { email: "e@x.com".into(), given_name: "Ravi".into(), family_name: "Gaygol".into() };
    assert_eq!(profile.display_name(), "Gaygol Ravi");
}

#[test]
fn provider_response_ok_range() {
    assert!(ProviderResponse { status: 200, body: String::new() }.is_ok());
    assert!(ProviderResponse { status: 204, body: String::new() }.is_ok());
    assert!(!ProviderResponse { status: 401, body: String::new() }.is_ok());
    assert!(!ProviderResponse { status: 500, body: String::new() }.is_ok());
}

// =============================================================================
// handle_callback
// =============================================================================

#[test]
fn callback_accepts_and_redirects_to_default() {
    let mut session = Session::default();
    let outcome = adapter().handle_callback(&mut session, &profile_response()).unwrap();
    assert_eq!(outcome, Outcome::Redirect("/".into()));
    let identity = session.identity().unwrap();
    assert_eq!(identity.email, "ravi@example.com");
    assert_eq!(identity.name, "Gaygol Ravi");
    assert_eq!(identity.method, AuthMethod::Google);
}

#[test]
fn callback_resolves_captured_redirect_once() {
    let auth = adapter();
    let mut session = Session::default();
    session.capture_redirect("/notes/3");
    let outcome = auth.handle_callback(&mut session, &profile_response()).unwrap();
    assert_eq!(outcome, Outcome::Redirect("/notes/3".into()));
    let again = auth.handle_callback(&mut session, &profile_response()).unwrap();
    assert_eq!(again, Outcome::Redirect("/".into()));
}

#[test]
fn callback_denied_leaves_session_anonymous() {
    let auth = adapter().with_login_handler(Arc::new(|email: &str, _name: &str| email.ends_with("@corp.example")));
    let mut session = Session::default();
    session.capture_redirect("/notes/3");
    let outcome = auth.handle_callback(&mut session, &profile_response()).unwrap();
    assert_eq!(outcome, Outcome::Denied);
    assert!(!session.is_authenticated());
    assert!(session.identity().is_none());
}

#[test]
fn policy_sees_email_and_constructed_name() {
    let auth = adapter()
        .with_login_handler(Arc::new(|email: &str, name: &str| email == "ravi@example.com" && name == "Gaygol Ravi"));
    let mut session = Session::default();
    assert!(matches!(auth.handle_callback(&mut session, &profile_response()), Ok(Outcome::Redirect(_))));
}

#[test]
fn domain_policy_matches_suffix_only() {
    let policy = domain_policy("corp.example");
    assert!(policy.allow("ravi@corp.example", "Gaygol Ravi"));
    assert!(!policy.allow("ravi@example.com", "Gaygol Ravi"));
    assert!(!policy.allow("ravi@evilcorp.example", "Gaygol Ravi"));
}

#[test]
fn callback_rejects_non_ok_response() {
    let mut session = Session::default();
    let resp = ProviderResponse { status: 401, body: "{}".into() };
    let err = adapter().handle_callback(&mut session, &resp).unwrap_err();
    assert!(matches!(err, ProviderError::Status(401)));
    assert!(!session.is_authenticated());
}

#[test]
fn callback_rejects_profile_without_names() {
    let mut session = Session::default();
    let resp = ProviderResponse { status: 200, body: r#"{"email":"a@b.com"}"#.into() };
    let err = adapter().handle_callback(&mut session, &resp).unwrap_err();
    assert!(matches!(err, ProviderError::MalformedProfile(_)));
}

// =============================================================================
// guards
// =============================================================================

#[test]
fn provider_paths() {
    let auth = adapter();
    assert!(auth.is_provider_path("/dance_google_auth"));
    assert!(auth.is_provider_path("/dance_google_auth/login"));
    assert!(!auth.is_provider_path("/dance_google_authx"));
    assert!(!auth.is_provider_path("/notes"));
}

#[test]
fn urls_hang_off_prefix() {
    let auth = GoogleAuth::new(None, "/g", "/home");
    assert_eq!(auth.login_url(), "/g/login");
    assert_eq!(auth.signin_url(), "/g/signin");
    assert_eq!(auth.signout_url(), "/g/signout");
    assert_eq!(auth.return_endpoint(), "/home");
    assert!(auth.config().is_none());
}

#[test]
fn login_required_redirects_and_captures() {
    let mut session = Session::default();
    let guard = adapter().login_required(&mut session, "/notes", "/notes?page=2");
    assert_eq!(guard, Guard::Respond(GuardResponse::Login("/dance_google_auth/login".into())));
    assert_eq!(session.pending_redirect(), Some("/notes?page=2"));
}

#[test]
fn login_required_skips_provider_routes() {
    let mut session = Session::default();
    let guard = adapter().login_required(&mut session, "/dance_google_auth/verify", "/dance_google_auth/verify");
    assert_eq!(guard, Guard::Proceed);
    assert!(session.pending_redirect().is_none());
}

#[test]
fn login_required_passes_authenticated() {
    let mut session = Session::default();
    session.mark_authenticated(SessionIdentity { email: "e".into(), name: "n".into(), method: AuthMethod::Password });
    assert_eq!(adapter().login_required(&mut session, "/", "/"), Guard::Proceed);
}

#[test]
fn auth_required_checks_predicate_after_login() {
    let auth = adapter();
    let admins_only = |s: &Session| s.identity().is_some_and(|i| i.email == "admin@example.com");

    let mut anonymous = Session::default();
    assert!(matches!(auth.auth_required(&mut anonymous, "/admin", "/admin", &admins_only), Guard::Respond(GuardResponse::Login(_))));

    let mut user = Session::default();
    user.mark_authenticated(SessionIdentity { email: "u@example.com".into(), name: "U".into(), method: AuthMethod::Google });
    let guard = auth.auth_required(&mut user, "/admin", "/admin", &admins_only);
    assert_eq!(
        guard,
        Guard::Respond(GuardResponse::NoPermission { signout_url: "/dance_google_auth/signout".into() })
    );
    assert!(user.is_authenticated(), "refusal does not revoke the session");

    let mut admin = Session::default();
    admin.mark_authenticated(SessionIdentity { email: "admin@example.com".into(), name: "A".into(), method: AuthMethod::Google });
    assert_eq!(auth.auth_required(&mut admin, "/admin", "/admin", &admins_only), Guard::Proceed);
}

#[test]
fn auth_required_skips_provider_routes() {
    let never = |_: &Session| false;
    let mut session = Session::default();
    assert_eq!(adapter().auth_required(&mut session, "/dance_google_auth/signout", "/x", &never), Guard::Proceed);
}
