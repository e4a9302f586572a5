//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the credential store, the OTP verifier with its pending-signup
//! table, the session table and the Google adapter. Every field is either
//! `Arc`-wrapped or a cheap handle around shared tables, so cloning the state
//! per request shares everything.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::credentials::CredentialStore;
use crate::services::google::GoogleAuth;
use crate::services::mail::Mailer;
use crate::services::otp::OtpVerifier;
use crate::services::session::{ANONYMOUS_TTL, AUTHENTICATED_TTL, SessionStore};

/// Shared application state, injected into Axum handlers via State extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub credentials: Arc<dyn CredentialStore>,
    pub otp: OtpVerifier,
    pub sessions: SessionStore,
    pub google: GoogleAuth,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        google: GoogleAuth,
    ) -> Self {
        let sessions = SessionStore::with_limits(config.session_capacity, AUTHENTICATED_TTL, ANONYMOUS_TTL);
        Self {
            config: Arc::new(config),
            credentials,
            otp: OtpVerifier::new(mailer),
            sessions,
            google,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
