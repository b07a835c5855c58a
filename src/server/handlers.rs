//! HTTP request handlers.
//!
//! Every handler reads the user's session key fresh from the store, opens
//! the inbound envelope (if any), calls into the vault, and seals the
//! outbound payload under the same key.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::error::ErrorResponse;
use super::AppState;
use crate::crypto::SessionCipher;
use crate::errors::{VaultError, Result};
use crate::generator;
use crate::vault::{AccountSettings, EntryId, EntryInput, UpdateOutcome};

const STORED_MESSAGE: &str = "Your password has been successfully stored";
const UPDATED_MESSAGE: &str = "Your password has been successfully updated";
const NO_DATA_MESSAGE: &str = "No Data Found";

/// Request body for POST /users/{user_id}/passwords.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    #[serde(rename = "cipherText")]
    pub cipher_text: String,
}

/// Request body for PUT /users/{user_id}/passwords/{password_id}.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(alias = "cipherText")]
    pub password: String,
}

/// Request body for PUT /users/{user_id}/master-password.
#[derive(Debug, Deserialize)]
pub struct RotateRequest {
    pub salt: String,
    pub verifier: String,
}

/// Request body for PUT /users/{user_id}/settings.
#[derive(Debug, Deserialize)]
pub struct SettingRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub option: String,
}

/// Response body for GET /users/{user_id}/random-password.
#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedPassword {
    pub data: String,
}

/// Response body for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Current session key for `user_id`.
async fn session_key(state: &AppState, user_id: &str) -> Result<Zeroizing<String>> {
    let user = state.credentials.require_user(user_id).await?;
    user.session_key
        .clone()
        .map(Zeroizing::new)
        .ok_or_else(|| VaultError::NoActiveSession(user_id.to_string()))
}

fn parse_entry_id(raw: &str) -> Result<EntryId> {
    raw.parse()
        .map_err(|_| VaultError::EntryNotFound(raw.to_string()))
}

/// GET /users/{user_id}/passwords
pub async fn list_entries(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<String>> {
    let key = session_key(&state, &user_id).await?;
    let entries = state.credentials.list(&user_id).await?;
    Ok(Json(SessionCipher::new(&key).encrypt(&entries)?))
}

/// POST /users/{user_id}/passwords
pub async fn add_entry(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: std::result::Result<Json<AddRequest>, JsonRejection>,
) -> Result<Json<&'static str>> {
    let Json(body) = body?;
    let key = session_key(&state, &user_id).await?;
    let input: EntryInput = SessionCipher::new(&key).decrypt(&body.cipher_text)?;

    let entry_id = state.credentials.add(&user_id, &input).await?;
    state
        .auditor
        .record("add", &user_id, Some(entry_id.to_string()), None)
        .await;
    Ok(Json(STORED_MESSAGE))
}

/// GET /users/{user_id}/passwords/{password_id}
pub async fn get_entry(
    State(state): State<AppState>,
    Path((user_id, password_id)): Path<(String, String)>,
) -> Result<Json<String>> {
    let key = session_key(&state, &user_id).await?;
    let entry_id = parse_entry_id(&password_id)?;
    let view = state.credentials.get(&user_id, entry_id).await?;
    Ok(Json(SessionCipher::new(&key).encrypt(&view)?))
}

/// PUT /users/{user_id}/passwords/{password_id}
///
/// An id that matches no entry still answers with the confirmation.
pub async fn update_entry(
    State(state): State<AppState>,
    Path((user_id, password_id)): Path<(String, String)>,
    body: std::result::Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<&'static str>> {
    let Json(body) = body?;
    let key = session_key(&state, &user_id).await?;
    let entry_id = parse_entry_id(&password_id)?;
    let input: EntryInput = SessionCipher::new(&key).decrypt(&body.password)?;

    if state.credentials.update(&user_id, entry_id, &input).await? == UpdateOutcome::Updated {
        state
            .auditor
            .record("update", &user_id, Some(entry_id.to_string()), None)
            .await;
    }
    Ok(Json(UPDATED_MESSAGE))
}

/// DELETE /users/{user_id}/passwords/{password_id}
///
/// Deleting an id that matches no entry still answers 200 but is not
/// audited.
pub async fn delete_entry(
    State(state): State<AppState>,
    Path((user_id, password_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let entry_id = parse_entry_id(&password_id)?;
    if state.credentials.remove(&user_id, entry_id).await? {
        state
            .auditor
            .record("delete", &user_id, Some(entry_id.to_string()), None)
            .await;
    }
    Ok(StatusCode::OK)
}

/// DELETE /users/{user_id}
pub async fn delete_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode> {
    if state.account.delete_account(&user_id).await? {
        state
            .auditor
            .record("delete-account", &user_id, None, None)
            .await;
    }
    Ok(StatusCode::OK)
}

/// PUT /users/{user_id}/master-password
pub async fn rotate_verifier(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: std::result::Result<Json<RotateRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(body) = body?;
    let generation = state
        .account
        .rotate_verifier(&user_id, &body.salt, &body.verifier)
        .await?;
    state
        .auditor
        .record(
            "rotate-verifier",
            &user_id,
            None,
            Some(format!("generation {generation}")),
        )
        .await;
    Ok(StatusCode::OK)
}

/// GET /users/{user_id}/settings
pub async fn get_settings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AccountSettings>> {
    Ok(Json(state.account.get_settings(&user_id).await?))
}

/// PUT /users/{user_id}/settings
pub async fn set_setting(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: std::result::Result<Json<SettingRequest>, JsonRejection>,
) -> Result<Json<String>> {
    let Json(body) = body?;
    let message = state
        .account
        .set_setting(&user_id, &body.kind, &body.option)
        .await?;
    state
        .auditor
        .record("set-setting", &user_id, None, Some(body.kind.clone()))
        .await;
    Ok(Json(message))
}

/// GET /users/{user_id}/url/{url}
pub async fn find_by_url(
    State(state): State<AppState>,
    Path((user_id, pattern)): Path<(String, String)>,
) -> Result<Response> {
    let key = session_key(&state, &user_id).await?;
    match state
        .credentials
        .find_by_url_pattern(&user_id, &pattern)
        .await?
    {
        Some(view) => Ok(Json(SessionCipher::new(&key).encrypt(&view)?).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("not_found", NO_DATA_MESSAGE)),
        )
            .into_response()),
    }
}

/// GET /users/{user_id}/random-password
pub async fn random_password(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<GeneratedPassword>> {
    let settings = state.account.get_settings(&user_id).await?;
    Ok(Json(GeneratedPassword {
        data: generator::generate(settings.password_option),
    }))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
