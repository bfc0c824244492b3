//! Table administration handlers

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use dbadmin_types::{
    AlterTableRequest, CreateTableRequest, Message, PageQuery, PageRequest, SqlQuery,
    TableBackup, TableData, TableInfo,
};
use serde_json::{Map, Value};

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<TableInfo>>> {
    Ok(Json(state.schema.list_tables().await?))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TableInfo>> {
    Ok(Json(state.schema.table_detail(&name).await?))
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreateTableRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let Json(request) = body?;
    state.schema.create_table(&request).await?;
    Ok((StatusCode::CREATED, Json(Message::new("table created"))))
}

pub async fn alter(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<AlterTableRequest>, JsonRejection>,
) -> ApiResult<Json<Message>> {
    let Json(request) = body?;
    state.schema.alter_table(&name, &request).await?;
    Ok(Json(Message::new("table altered")))
}

pub async fn drop(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Message>> {
    state.schema.drop_table(&name).await?;
    Ok(Json(Message::new("table dropped")))
}

pub async fn data(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<TableData>> {
    let page = PageRequest::from(query);
    Ok(Json(state.schema.table_page(&name, &page).await?))
}

pub async fn query(
    State(state): State<AppState>,
    body: Result<Json<SqlQuery>, JsonRejection>,
) -> ApiResult<Json<Vec<Map<String, Value>>>> {
    let Json(query) = body?;
    if !query.is_select() {
        return Err(ApiError::BadRequest(
            "only SELECT statements are allowed".to_string(),
        ));
    }
    Ok(Json(state.schema.run_query(&query.sql).await?))
}

pub async fn export(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TableBackup>> {
    Ok(Json(state.schema.export_table(&name).await?))
}

pub async fn import(
    State(state): State<AppState>,
    body: Result<Json<TableBackup>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let Json(backup) = body?;
    state.schema.import_table(&backup).await?;
    Ok((StatusCode::CREATED, Json(Message::new("table imported"))))
}
