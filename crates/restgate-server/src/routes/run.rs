//! The run endpoint: execute a configured API call against a connected
//! system.

use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use restgate_gateway::RunRequest;

use crate::app_state::AppState;
use crate::error::ApiResult;

pub async fn run(
    State(state): State<AppState>,
    Path((subsystem, configuration, resource)): Path<(String, String, String)>,
    Json(run_request): Json<RunRequest>,
) -> ApiResult<Response> {
    let document = state.store.get(&configuration)?;
    let outcome = state
        .orchestrator
        .run(&subsystem, &document, &resource, run_request)
        .await?;

    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, outcome.body).into_response();
    let headers = response.headers_mut();
    for (name, values) in &outcome.headers {
        let Ok(name) = HeaderName::try_from(name.as_str()) else {
            tracing::warn!(header = %name, "dropping invalid response header name");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => {
                    tracing::warn!(header = %name, "dropping invalid response header value");
                }
            }
        }
    }
    Ok(response)
}
