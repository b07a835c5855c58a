//! HTTP server built on axum.
//!
//! Sets up routes and shared state, and runs the listener until ctrl-c.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::audit::Auditor;
use crate::crypto::FieldEncryptor;
use crate::errors::{VaultError, Result};
use crate::vault::{AccountSettingsManager, CredentialStore, UserStore};

pub use error::ErrorResponse;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub account: Arc<AccountSettingsManager>,
    pub auditor: Auditor,
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserStore>,
        fields: Arc<dyn FieldEncryptor>,
        max_pattern_len: usize,
        auditor: Auditor,
    ) -> Self {
        let credentials = CredentialStore::new(users.clone(), fields.clone())
            .with_max_pattern_len(max_pattern_len);
        Self {
            credentials: Arc::new(credentials),
            account: Arc::new(AccountSettingsManager::new(users, fields)),
            auditor,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/users/{user_id}", axum::routing::delete(handlers::delete_account))
        .route(
            "/users/{user_id}/passwords",
            get(handlers::list_entries).post(handlers::add_entry),
        )
        .route(
            "/users/{user_id}/passwords/{password_id}",
            get(handlers::get_entry)
                .put(handlers::update_entry)
                .delete(handlers::delete_entry),
        )
        .route(
            "/users/{user_id}/master-password",
            put(handlers::rotate_verifier),
        )
        .route(
            "/users/{user_id}/settings",
            get(handlers::get_settings).put(handlers::set_setting),
        )
        .route("/users/{user_id}/url/{url}", get(handlers::find_by_url))
        .route(
            "/users/{user_id}/random-password",
            get(handlers::random_password),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| VaultError::CommandFailed(format!("failed to bind {addr}: {e}")))?;

    tracing::info!(%addr, "credvault listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
