//! User handlers

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use dbadmin_types::{Message, NewUser, User, UserFilter, UserPatch};

fn not_found(id: u64) -> ApiError {
    ApiError::NotFound(format!("user {} not found", id))
}

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> ApiResult<Json<Vec<User>>> {
    let users = state.users.list_users(filter.name.as_deref()).await?;
    Ok(Json(users))
}

pub async fn get(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<Json<User>> {
    let Path(id) = path?;
    let user = state.users.get_user(id).await?.ok_or_else(|| not_found(id))?;
    Ok(Json(user))
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let Json(new_user) = body?;
    if let Some(field) = new_user.missing_field() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }

    let user = state.users.create_user(&new_user).await?;
    tracing::info!("Created user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// The user must exist before the body is looked at, so an unknown id is a
/// 404 even when the payload is malformed.
pub async fn update(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    body: Result<Json<UserPatch>, JsonRejection>,
) -> ApiResult<Json<User>> {
    let Path(id) = path?;
    if state.users.get_user(id).await?.is_none() {
        return Err(not_found(id));
    }

    let Json(patch) = body?;
    let user = state
        .users
        .update_user(id, patch)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(user))
}

pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<Json<Message>> {
    let Path(id) = path?;
    state.users.delete_user(id).await?;
    tracing::info!("Deleted user {}", id);
    Ok(Json(Message::new("user deleted")))
}
