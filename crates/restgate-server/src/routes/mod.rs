//! REST route wiring.

mod configurations;
mod run;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::error::ErrorResponse;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/resource-configurations",
            post(configurations::upload).get(configurations::list),
        )
        .route(
            "/v1/resource-configurations/:name",
            get(configurations::get_one)
                .put(configurations::replace)
                .delete(configurations::delete_one),
        )
        .route(
            "/v1/resource-configurations/:name/download",
            get(configurations::download),
        )
        .route(
            "/v1/subsystems/:subsystem/resource-configurations/:configuration/resources/:resource/run",
            post(run::run),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(internal_error_response))
        .with_state(state)
}

/// Unclassified failures surface as a generic coded internal error instead
/// of leaking implementation detail.
fn internal_error_response(_panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    tracing::error!("internal server error");
    let body = ErrorResponse {
        error_code: "RG-500".to_string(),
        error_message: "internal server error".to_string(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
