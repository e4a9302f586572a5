//! One-time code verification for signups.
//!
//! ARCHITECTURE
//! ============
//! `issue` validates a signup candidate, mails it a six-digit code and parks
//! the candidate in a pending table under a fresh random handle. `confirm`
//! takes the handle back together with the code the user typed. Each handle
//! owns its own code, so concurrent signups never see each other's codes.
//!
//! TRADE-OFFS
//! ==========
//! Codes do not expire and wrong guesses are not counted; a handle stays
//! valid until its code is confirmed. Only the SHA-256 digest of the code is
//! kept in memory.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::mail::{MailError, Mailer};
use super::session::{bytes_to_hex, generate_token};

pub const CODE_MAX: u32 = 999_999;
pub const CODE_DIGITS: usize = 6;
const OTP_SUBJECT: &str = "OTP";

const MIN_EMAIL_CHARS: usize = 4;
const MIN_NAME_CHARS: usize = 2;
const MIN_PASSWORD_CHARS: usize = 7;

// =============================================================================
// ERRORS
// =============================================================================

/// A signup field failed validation. Messages are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Email must be greater than 3 characters.")]
    EmailTooShort,
    #[error("First name must be greater than 1 character.")]
    FirstNameTooShort,
    #[error("Passwords don't match.")]
    PasswordMismatch,
    #[error("Password must be at least 7 characters.")]
    PasswordTooShort,
}

impl ValidationError {
    /// Form field the error refers to.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmailTooShort => "email",
            Self::FirstNameTooShort => "firstName",
            Self::PasswordMismatch => "password2",
            Self::PasswordTooShort => "password1",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Mail(#[from] MailError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("unknown or already used verification handle")]
    UnknownHandle,
    #[error("code is not a six-digit number")]
    InvalidCode,
    #[error("code does not match")]
    CodeMismatch,
}

// =============================================================================
// CANDIDATE / HANDLE
// =============================================================================

/// Signup form contents waiting for email confirmation.
#[derive(Clone, PartialEq, Eq)]
pub struct SignupCandidate {
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub password_confirmation: String,
}

impl fmt::Debug for SignupCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupCandidate")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl SignupCandidate {
    /// Check the fields in form order; the first failure wins.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] of the first failing field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.chars().count() < MIN_EMAIL_CHARS {
            return Err(ValidationError::EmailTooShort);
        }
        if self.display_name.chars().count() < MIN_NAME_CHARS {
            return Err(ValidationError::FirstNameTooShort);
        }
        if self.password != self.password_confirmation {
            return Err(ValidationError::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ValidationError::PasswordTooShort);
        }
        Ok(())
    }
}

/// Opaque reference to a pending signup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VerificationHandle(String);

impl VerificationHandle {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct PendingSignup {
    candidate: SignupCandidate,
    code_hash: String,
}

// =============================================================================
// CODES
// =============================================================================

/// Uniform random code in `0..=999_999`.
#[must_use]
pub fn generate_otp() -> u32 {
    rand::rng().random_range(0..=CODE_MAX)
}

/// Zero-padded six-digit rendering.
#[must_use]
pub fn format_otp(code: u32) -> String {
    format!("{code:0width$}", width = CODE_DIGITS)
}

/// Parse user input as an integer code; `"456"` and `"000456"` are the same code.
#[must_use]
pub fn parse_otp(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<u32>().ok().filter(|code| *code <= CODE_MAX)
}

fn hash_otp(code: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format_otp(code).as_bytes());
    bytes_to_hex(&hasher.finalize())
}

// =============================================================================
// VERIFIER
// =============================================================================

/// Issues and confirms signup codes. Cheap to clone; clones share the pending table.
#[derive(Clone)]
pub struct OtpVerifier {
    pending: Arc<RwLock<HashMap<String, PendingSignup>>>,
    mailer: Arc<dyn Mailer>,
}

impl OtpVerifier {
    #[must_use]
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { pending: Arc::new(RwLock::new(HashMap::new())), mailer }
    }

    /// Validate `candidate`, mail it a fresh code and return the handle to confirm with.
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::Validation`] without sending anything, or
    /// [`IssueError::Mail`] if the code could not be delivered.
    pub async fn issue(&self, candidate: SignupCandidate) -> Result<VerificationHandle, IssueError> {
        self.issue_with_code(candidate, generate_otp()).await
    }

    pub(crate) async fn issue_with_code(
        &self,
        candidate: SignupCandidate,
        code: u32,
    ) -> Result<VerificationHandle, IssueError> {
        candidate.validate()?;

        // Only a delivered code becomes confirmable.
        self.mailer.send(&candidate.email, OTP_SUBJECT, &format_otp(code)).await?;

        let handle = generate_token();
        tracing::info!(email = %candidate.email, "signup code issued");
        self.pending
            .write()
            .await
            .insert(handle.clone(), PendingSignup { candidate, code_hash: hash_otp(code) });
        Ok(VerificationHandle(handle))
    }

    /// Check `submitted` against the code issued for `handle`. A match consumes the handle.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::UnknownHandle`] for unknown or consumed
    /// handles, [`VerificationError::InvalidCode`] for non-numeric input and
    /// [`VerificationError::CodeMismatch`] for a wrong code (the handle stays usable).
    pub async fn confirm(&self, handle: &str, submitted: &str) -> Result<SignupCandidate, VerificationError> {
        let mut pending = self.pending.write().await;
        let entry = pending.get(handle).ok_or(VerificationError::UnknownHandle)?;
        let code = parse_otp(submitted).ok_or(VerificationError::InvalidCode)?;
        if entry.code_hash != hash_otp(code) {
            tracing::debug!(email = %entry.candidate.email, "signup code mismatch");
            return Err(VerificationError::CodeMismatch);
        }
        let entry = pending.remove(handle).ok_or(VerificationError::UnknownHandle)?;
        Ok(entry.candidate)
    }

    /// Number of signups waiting for confirmation.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}

#[cfg(test)]
#[path = "otp_test.rs"]
mod tests;
