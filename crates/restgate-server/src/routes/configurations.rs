//! Resource configuration CRUD endpoints.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use restgate_core::ResourceConfiguration;

use crate::app_state::AppState;
use crate::error::ApiResult;

pub async fn upload(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ResourceConfiguration>)> {
    let document = state.store.upload(&body)?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<ResourceConfiguration>> {
    Json(state.store.list())
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ResourceConfiguration>> {
    Ok(Json(state.store.get(&name)?))
}

pub async fn replace(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ResourceConfiguration>> {
    Ok(Json(state.store.replace(&name, &body)?))
}

pub async fn delete_one(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let contents = state.store.download(&name)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/yaml".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.yml\"", name),
            ),
        ],
        contents,
    ))
}
