//! Key-value endpoints

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::ApiError;
use crate::context::AppContext;
use crate::types::{KeyList, KeyValue};

/// Body of `POST /`
///
/// Missing fields read as empty strings; an empty key is rejected.
#[derive(Debug, Deserialize)]
pub struct PutRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /:key - Get a single key
pub async fn get_key(
    State(ctx): State<Arc<AppContext>>,
    Path(key): Path<String>,
) -> Result<Json<KeyValue>, ApiError> {
    match ctx.store.get(&key).await {
        Ok(Some(kv)) => Ok(Json(kv)),
        Ok(None) => Err(ApiError::NotFound),
        Err(e) => {
            error!(key = %key, error = %e, "get failed");
            Err(e.into())
        }
    }
}

/// GET / - List every key in store order
pub async fn list_keys(State(ctx): State<Arc<AppContext>>) -> Result<Json<KeyList>, ApiError> {
    let keys = ctx.store.list("").await.map_err(|e| {
        error!(error = %e, "list failed");
        ApiError::from(e)
    })?;

    Ok(Json(KeyList::from(keys)))
}

/// POST / - Put a key
pub async fn put_key(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<PutRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;

    if request.key.is_empty() {
        return Err(ApiError::Validation("key must not be empty".to_string()));
    }

    let revision = ctx.store.put(&request.key, &request.value).await.map_err(|e| {
        error!(key = %request.key, error = %e, "put failed");
        ApiError::from(e)
    })?;

    info!(key = %request.key, revision, "key stored");

    Ok(Json(MessageResponse {
        message: "Key-value pair added successfully".to_string(),
    }))
}
