//! Google OAuth adapter — authorize URL, code exchange, profile mapping,
//! and the login guards that send anonymous requests through Google.
//!
//! ARCHITECTURE
//! ============
//! The provider round-trip is: guard captures the requested URL and
//! redirects to `{prefix}/login` → Google → `{prefix}/verify` callback →
//! [`GoogleAuth::handle_callback`] maps the profile onto the session and
//! resolves the captured URL. Who may log in is decided by an injected
//! [`LoginPolicy`], fixed when the adapter is built.

use std::sync::Arc;

use serde::Deserialize;

use super::session::{AuthMethod, Session, SessionIdentity};

pub const DEFAULT_ROUTE_PREFIX: &str = "/dance_google_auth";

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/userinfo";
const SCOPES: &str = "profile email";

/// Google OAuth client credentials loaded from environment.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl GoogleConfig {
    /// Load from `GOOGLE_OAUTH_CLIENT_ID`, `GOOGLE_OAUTH_CLIENT_SECRET`,
    /// `GOOGLE_OAUTH_REDIRECT_URI`. Returns `None` if any are missing
    /// (provider routes will answer 503).
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("GOOGLE_OAUTH_CLIENT_ID").ok()?;
        let client_secret = std::env::var("GOOGLE_OAUTH_CLIENT_SECRET").ok()?;
        let redirect_uri = std::env::var("GOOGLE_OAUTH_REDIRECT_URI").ok()?;
        Some(Self { client_id, client_secret, redirect_uri })
    }

    /// Build the Google authorization URL carrying `state`.
    #[must_use]
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{AUTHORIZE_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("google token exchange failed: {0}")]
    TokenExchange(String),
    #[error("google request failed: {0}")]
    Request(String),
    #[error("google responded with status {0}")]
    Status(u16),
    #[error("malformed google profile: {0}")]
    MalformedProfile(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Raw userinfo reply, before it is trusted.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The profile fields the adapter consumes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleProfile {
    pub email: String,
    pub given_name: String,
    pub family_name: String,
}

impl GoogleProfile {
    /// Family name first, then given name.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.family_name, self.given_name)
    }
}

// =============================================================================
// LOGIN POLICY
// =============================================================================

/// Decides whether a Google account may log in.
pub trait LoginPolicy: Send + Sync {
    fn allow(&self, email: &str, name: &str) -> bool;
}

impl<F> LoginPolicy for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn allow(&self, email: &str, name: &str) -> bool {
        self(email, name)
    }
}

/// Lets every Google account in.
pub struct AllowAll;

impl LoginPolicy for AllowAll {
    fn allow(&self, _email: &str, _name: &str) -> bool {
        true
    }
}

/// Admit only addresses ending in `@{domain}`.
#[must_use]
pub fn domain_policy(domain: &str) -> Arc<dyn LoginPolicy> {
    let suffix = format!("@{domain}");
    Arc::new(move |email: &str, _name: &str| email.ends_with(&suffix))
}

/// Result of a provider callback that reached the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Logged in; continue to this URL.
    Redirect(String),
    /// The policy refused the account.
    Denied,
}

// =============================================================================
// GUARDS
// =============================================================================

/// Extra access check applied after login by [`GoogleAuth::auth_required`].
pub type AccessPredicate = Arc<dyn Fn(&Session) -> bool + Send + Sync>;

/// Terminal responses a guard can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardResponse {
    /// Not logged in: go through the provider login.
    Login(String),
    /// Logged in but refused by the access predicate.
    NoPermission { signout_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Proceed,
    Respond(GuardResponse),
}

// =============================================================================
// ADAPTER
// =============================================================================

#[derive(Clone)]
pub struct GoogleAuth {
    config: Option<GoogleConfig>,
    prefix: String,
    return_endpoint: String,
    policy: Arc<dyn LoginPolicy>,
    http: reqwest::Client,
    token_url: String,
    userinfo_url: String,
}

impl GoogleAuth {
    /// Adapter mounted at `prefix`, landing on `return_endpoint` after login.
    /// Starts with the [`AllowAll`] policy.
    #[must_use]
    pub fn new(config: Option<GoogleConfig>, prefix: &str, return_endpoint: &str) -> Self {
        Self {
            config,
            prefix: prefix.to_owned(),
            return_endpoint: return_endpoint.to_owned(),
            policy: Arc::new(AllowAll),
            http: reqwest::Client::new(),
            token_url: TOKEN_URL.to_owned(),
            userinfo_url: USERINFO_URL.to_owned(),
        }
    }

    /// Point the token exchange and profile fetch somewhere other than Google.
    #[must_use]
    pub fn with_endpoints(mut self, token_url: &str, userinfo_url: &str) -> Self {
        self.token_url = token_url.to_owned();
        self.userinfo_url = userinfo_url.to_owned();
        self
    }

    /// Replace the login policy.
    #[must_use]
    pub fn with_login_handler(mut self, policy: Arc<dyn LoginPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn config(&self) -> Option<&GoogleConfig> {
        self.config.as_ref()
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn return_endpoint(&self) -> &str {
        &self.return_endpoint
    }

    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}/login", self.prefix)
    }

    #[must_use]
    pub fn signin_url(&self) -> String {
        format!("{}/signin", self.prefix)
    }

    #[must_use]
    pub fn signout_url(&self) -> String {
        format!("{}/signout", self.prefix)
    }

    /// Whether `path` is one of the adapter's own routes.
    #[must_use]
    pub fn is_provider_path(&self, path: &str) -> bool {
        path.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::TokenExchange`] on transport failure or an
    /// unexpected reply.
    pub async fn exchange_code(&self, config: &GoogleConfig, code: &str) -> Result<String, ProviderError> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::TokenExchange(e.to_string()))?;

        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::TokenExchange(e.to_string()))?;
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|_| ProviderError::TokenExchange(format!("unexpected response: {body}")))?;
        Ok(token.access_token)
    }

    /// Fetch the userinfo document. Non-2xx replies are returned, not raised;
    /// [`Self::handle_callback`] decides what they mean.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Request`] on transport failure.
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<ProviderResponse, ProviderError> {
        let resp = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(ProviderResponse { status, body })
    }

    /// Map a userinfo reply onto `session`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Status`] for a non-2xx reply and
    /// [`ProviderError::MalformedProfile`] if the profile lacks required fields.
    pub fn handle_callback(&self, session: &mut Session, response: &ProviderResponse) -> Result<Outcome, ProviderError> {
        if !response.is_ok() {
            return Err(ProviderError::Status(response.status));
        }
        let profile: GoogleProfile =
            serde_json::from_str(&response.body).map_err(|e| ProviderError::MalformedProfile(e.to_string()))?;
        let name = profile.display_name();

        if self.policy.allow(&profile.email, &name) {
            tracing::info!(email = %profile.email, "google login accepted");
            session.mark_authenticated(SessionIdentity { email: profile.email, name, method: AuthMethod::Google });
            Ok(Outcome::Redirect(session.consume_redirect(&self.return_endpoint)))
        } else {
            tracing::warn!(email = %profile.email, "google login refused by policy");
            session.mark_unauthenticated();
            Ok(Outcome::Denied)
        }
    }

    /// Send anonymous requests through the provider login, remembering `url`.
    pub fn login_required(&self, session: &mut Session, path: &str, url: &str) -> Guard {
        if self.is_provider_path(path) || session.is_authenticated() {
            return Guard::Proceed;
        }
        session.capture_redirect(url);
        Guard::Respond(GuardResponse::Login(self.login_url()))
    }

    /// [`Self::login_required`], then `predicate` must accept the session.
    /// A refusal offers sign-out but leaves the session logged in.
    pub fn auth_required(
        &self,
        session: &mut Session,
        path: &str,
        url: &str,
        predicate: &(dyn Fn(&Session) -> bool + Send + Sync),
    ) -> Guard {
        if self.is_provider_path(path) {
            return Guard::Proceed;
        }
        if let Guard::Respond(resp) = self.login_required(session, path, url) {
            return Guard::Respond(resp);
        }
        if predicate(session) {
            Guard::Proceed
        } else {
            Guard::Respond(GuardResponse::NoPermission { signout_url: self.signout_url() })
        }
    }
}

#[cfg(test)]
#[path = "google_test.rs"]
mod tests;
