//! HTTP handlers.
//!
//! Every failure except an uninitialized counter is reported as a generic
//! 500; the underlying error, including any simulation logs, is logged and
//! never returned to the client.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use journal_core::{IndexedEntry, Initialization, JournalError, PreparedTransaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use solana_wire::Pubkey;
use tracing::{error, info};

use crate::state::AppState;

pub const COUNTER_NOT_INITIALIZED: &str = "Counter not initialized";

// ============ Errors ============

pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    /// Map a core error onto the public response, logging the detail.
    fn from_journal(err: JournalError, fallback: &'static str) -> Self {
        match err {
            JournalError::CounterNotInitialized { counter } => {
                info!(%counter, "request rejected: counter not initialized");
                Self {
                    status: StatusCode::BAD_REQUEST,
                    message: COUNTER_NOT_INITIALIZED,
                }
            }
            JournalError::EstimationFailed { reason, logs } => {
                error!(%reason, ?logs, "{fallback}");
                Self::internal(fallback)
            }
            other => {
                error!(error = %other, "{fallback}");
                Self::internal(fallback)
            }
        }
    }

    fn internal(message: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_address(text: &str, fallback: &'static str) -> Result<Pubkey, ApiError> {
    text.parse::<Pubkey>().map_err(|e| {
        error!(address = text, error = %e, "{fallback}");
        ApiError::internal(fallback)
    })
}

/// Unwrap a request body, reporting a rejected one as the generic failure.
fn json_body<T>(
    body: Result<Json<T>, JsonRejection>,
    fallback: &'static str,
) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|e| {
        error!(status = %e.status(), error = %e, "{fallback}");
        ApiError::internal(fallback)
    })
}

// ============ Request / Response Types ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub signer_address: String,
    pub title: String,
    pub message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryRequest {
    pub signer_address: String,
    pub count: u32,
    pub title: String,
    pub message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEntryRequest {
    pub signer_address: String,
    pub count: u32,
}

#[derive(Deserialize)]
pub struct FetchEntriesQuery {
    pub owner: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedResponse {
    /// Base64 wire transaction awaiting the owner's signature.
    pub transaction: String,
    pub message: &'static str,
    pub entry_address: String,
    pub count: u32,
}

impl PreparedResponse {
    fn new(prepared: &PreparedTransaction, message: &'static str) -> Self {
        Self {
            transaction: prepared.to_base64(),
            message,
            entry_address: prepared.entry_address.to_string(),
            count: prepared.count,
        }
    }
}

// ============ Handlers ============

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn create_journal_entry(
    State(state): State<AppState>,
    body: Result<Json<CreateEntryRequest>, JsonRejection>,
) -> Result<Json<PreparedResponse>, ApiError> {
    const FAILED: &str = "Failed to create journal entry";

    let req = json_body(body, FAILED)?;
    let signer = parse_address(&req.signer_address, FAILED)?;
    let prepared = state
        .journal
        .prepare_create_entry(&signer, &req.title, &req.message)
        .await
        .map_err(|e| ApiError::from_journal(e, FAILED))?;

    info!(owner = %signer, entry = %prepared.entry_address, "journal entry transaction created");
    Ok(Json(PreparedResponse::new(
        &prepared,
        "Transaction created. Sign and submit it to create the journal entry.",
    )))
}

pub async fn update_journal_entry(
    State(state): State<AppState>,
    body: Result<Json<UpdateEntryRequest>, JsonRejection>,
) -> Result<Json<PreparedResponse>, ApiError> {
    const FAILED: &str = "Failed to update journal entry";

    let req = json_body(body, FAILED)?;
    let signer = parse_address(&req.signer_address, FAILED)?;
    let prepared = state
        .journal
        .prepare_update_entry(&signer, req.count, &req.title, &req.message)
        .await
        .map_err(|e| ApiError::from_journal(e, FAILED))?;

    Ok(Json(PreparedResponse::new(
        &prepared,
        "Transaction created. Sign and submit it to update the journal entry.",
    )))
}

pub async fn delete_journal_entry(
    State(state): State<AppState>,
    body: Result<Json<DeleteEntryRequest>, JsonRejection>,
) -> Result<Json<PreparedResponse>, ApiError> {
    const FAILED: &str = "Failed to delete journal entry";

    let req = json_body(body, FAILED)?;
    let signer = parse_address(&req.signer_address, FAILED)?;
    let prepared = state
        .journal
        .prepare_delete_entry(&signer, req.count)
        .await
        .map_err(|e| ApiError::from_journal(e, FAILED))?;

    Ok(Json(PreparedResponse::new(
        &prepared,
        "Transaction created. Sign and submit it to delete the journal entry.",
    )))
}

/// Entries for `?owner=`, or every entry when no owner is given.
pub async fn fetch_journal_entries(
    State(state): State<AppState>,
    Query(query): Query<FetchEntriesQuery>,
) -> Result<Json<Vec<IndexedEntry>>, ApiError> {
    const FAILED: &str = "Failed to fetch journal entries";

    let entries = match query.owner.as_deref().filter(|o| !o.is_empty()) {
        Some(owner) => {
            let owner = parse_address(owner, FAILED)?;
            state.indexer.list_by_owner(&owner).await
        }
        None => state.indexer.list_all().await,
    }
    .map_err(|e| ApiError::from_journal(e, FAILED))?;

    info!(count = entries.len(), "fetched journal entries");
    Ok(Json(entries))
}

pub async fn initialize_counter(State(state): State<AppState>) -> Response {
    match state.counter.initialize().await {
        Ok(Initialization::Initialized { counter, signature }) => Json(json!({
            "success": true,
            "signature": signature,
            "counterPda": counter.to_string(),
        }))
        .into_response(),
        Ok(Initialization::AlreadyInitialized { counter, count }) => Json(json!({
            "success": true,
            "signature": null,
            "counterPda": counter.to_string(),
            "count": count,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "counter initialization failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Failed to initialize counter" })),
            )
                .into_response()
        }
    }
}
