//! Cache key handlers

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use dbadmin_types::{KeyPattern, Message, RedisEntry};

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<KeyPattern>,
) -> ApiResult<Json<Vec<RedisEntry>>> {
    let pattern = if query.pattern.trim().is_empty() {
        "*"
    } else {
        query.pattern.as_str()
    };
    Ok(Json(state.cache.list_entries(pattern).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<RedisEntry>> {
    state
        .cache
        .get_entry(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("key {} not found", key)))
}

/// `ttl` of zero stores the key without expiry.
pub async fn set(
    State(state): State<AppState>,
    body: Result<Json<RedisEntry>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let Json(entry) = body?;
    if entry.key.is_empty() {
        return Err(ApiError::BadRequest("key is required".to_string()));
    }

    state.cache.set(&entry.key, &entry.value, entry.ttl).await?;
    Ok((StatusCode::CREATED, Json(Message::new("key set"))))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<Message>> {
    state.cache.delete(&key).await?;
    Ok(Json(Message::new("key deleted")))
}
