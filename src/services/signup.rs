//! Email/password signup: duplicate check, OTP round-trip, account creation.
//!
//! No user row is written until `complete` sees the right code for its handle.

use uuid::Uuid;

use super::credentials::{CredentialError, CredentialStore, hash_password_blocking};
use super::mail::MailError;
use super::otp::{IssueError, OtpVerifier, SignupCandidate, ValidationError, VerificationError, VerificationHandle};

#[derive(Debug, thiserror::Error)]
pub enum SignupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl From<IssueError> for SignupError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Validation(e) => Self::Validation(e),
            IssueError::Mail(e) => Self::Mail(e),
        }
    }
}

/// Reject taken emails, then validate the form fields.
///
/// # Errors
///
/// Returns [`CredentialError::DuplicateEmail`] (wrapped) or the first
/// [`ValidationError`].
pub async fn check(store: &dyn CredentialStore, candidate: &SignupCandidate) -> Result<(), SignupError> {
    if store.find_by_email(&candidate.email).await?.is_some() {
        return Err(CredentialError::DuplicateEmail.into());
    }
    candidate.validate()?;
    Ok(())
}

/// Check the candidate and mail it a verification code.
///
/// # Errors
///
/// Everything [`check`] returns, plus [`SignupError::Mail`] on delivery failure.
pub async fn begin(
    store: &dyn CredentialStore,
    verifier: &OtpVerifier,
    candidate: SignupCandidate,
) -> Result<VerificationHandle, SignupError> {
    check(store, &candidate).await?;
    Ok(verifier.issue(candidate).await?)
}

/// Confirm the code for `handle` and create the account.
///
/// # Errors
///
/// Returns [`SignupError::Verification`] for a bad handle or code, and
/// [`SignupError::Credential`] if the email was taken in the meantime.
pub async fn complete(
    store: &dyn CredentialStore,
    verifier: &OtpVerifier,
    handle: &str,
    submitted_code: &str,
) -> Result<Uuid, SignupError> {
    let candidate = verifier.confirm(handle, submitted_code).await?;
    let password_hash = hash_password_blocking(candidate.password).await?;
    let id = store
        .create_user(&candidate.email, &candidate.display_name, &password_hash)
        .await?;
    tracing::info!(%id, email = %candidate.email, "account created");
    Ok(id)
}

#[cfg(test)]
#[path = "signup_test.rs"]
mod tests;
