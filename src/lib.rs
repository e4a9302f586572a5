//! Email/password and Google sign-in for axum apps.
//!
//! ARCHITECTURE
//! ============
//! The binary in `main.rs` serves [`routes::app`] on its own. Apps that carry
//! their own pages mount the same pieces instead: [`routes::google::routes`]
//! under the adapter prefix, and [`routes::google::protect_all_login`] or
//! [`routes::google::protect_all_auth`] around the routers they want guarded.

pub mod config;
pub mod db;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{AppConfig, StoreKind};
pub use state::AppState;
