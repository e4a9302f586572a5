//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own credentials, verification codes, sessions, mail and
//! the Google provider so route handlers can stay focused on protocol
//! translation and cookie plumbing.

pub mod credentials;
pub mod google;
pub mod mail;
pub mod otp;
pub mod session;
pub mod signup;
