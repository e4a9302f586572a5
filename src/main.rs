use std::sync::Arc;

use notes_auth::services::credentials::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use notes_auth::services::google::{GoogleAuth, GoogleConfig, domain_policy};
use notes_auth::services::mail::{LogMailer, Mailer, SmtpConfig, SmtpMailer};
use notes_auth::{AppConfig, AppState, StoreKind, db, routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;

    let credentials: Arc<dyn CredentialStore> = match (config.store, config.database_url.as_deref()) {
        (StoreKind::Postgres, Some(database_url)) => {
            let pool = db::init_pool(database_url).await?;
            Arc::new(PgCredentialStore::new(pool))
        }
        _ => {
            tracing::warn!("using in-memory credential store — accounts are lost on restart");
            Arc::new(MemoryCredentialStore::new())
        }
    };

    // Mail is non-fatal: without SMTP settings verification codes are logged.
    let mailer: Arc<dyn Mailer> = match SmtpConfig::from_env() {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, "smtp mailer initialized");
            Arc::new(SmtpMailer::new(&smtp)?)
        }
        None => {
            tracing::warn!("SMTP not configured — verification mails will be logged");
            Arc::new(LogMailer)
        }
    };

    let google_config = GoogleConfig::from_env();
    if google_config.is_none() {
        tracing::warn!("Google OAuth not configured — provider routes disabled");
    }
    let mut google = GoogleAuth::new(google_config, &config.google_prefix, &config.return_endpoint);
    if let Some(domain) = &config.google_allowed_domain {
        tracing::info!(%domain, "google logins restricted to domain");
        google = google.with_login_handler(domain_policy(domain));
    }

    let port = config.port;
    let state = AppState::new(config, credentials, mailer, google);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "notes-auth listening");
    axum::serve(listener, app).await?;
    Ok(())
}
