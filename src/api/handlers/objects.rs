use crate::AppState;
use crate::api::error::AppError;
use crate::models::{ObjectReader, PutObjectRequest, Scope, VideoProcessingParams};
use crate::utils::validation::is_valid_key_segment;
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use futures::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::StreamReader;
use utoipa::IntoParams;

/// Stand-in for the session layer: the caller's tenant scope.
pub const SCOPE_HEADER: &str = "x-scope-id";
pub const VIDEO_PARAMS_HEADER: &str = "x-video-processing-params";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PutObjectQuery {
    /// FAST_ACCESS or ARCHIVAL
    pub storage_class: Option<String>,
}

#[utoipa::path(
    put,
    path = "/objects/{key}",
    params(
        ("key" = String, Path, description = "Object key; may contain '/'"),
        ("x-scope-id" = String, Header, description = "Tenant scope of the object"),
        ("x-video-processing-params" = Option<String>, Header, description = "JSON processing params, e.g. {\"type\":\"MP4_H264_AAC\"}"),
        PutObjectQuery
    ),
    request_body(content = Vec<u8>, description = "Raw object bytes", content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Accepted; durable write continues in the background", body = crate::models::DurableObject),
        (status = 200, description = "Identical content already stored", body = crate::models::DurableObject),
        (status = 400, description = "Validation failed or malformed scope"),
        (status = 401, description = "Missing scope"),
        (status = 413, description = "Request body exceeds the configured limit"),
        (status = 422, description = "Video processing requested for archival storage"),
        (status = 500, description = "Staging or storage backend failure")
    ),
    tag = "objects"
)]
pub async fn put_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<PutObjectQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let scope = scope_from_headers(&headers)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let video_processing_params = video_params_from_headers(&headers)?;

    let read_stream: ObjectReader = Box::new(StreamReader::new(
        body.into_data_stream().map_err(std::io::Error::other),
    ));

    let outcome = state
        .object_service
        .put_object(
            &scope,
            PutObjectRequest {
                key,
                content_type,
                storage_class: query.storage_class.unwrap_or_default(),
                video_processing_params,
                read_stream,
            },
        )
        .await?;

    Ok((outcome.status, Json(outcome.object)))
}

/// Missing scope is 401. A scope that could not name a storage prefix is 400.
fn scope_from_headers(headers: &HeaderMap) -> Result<Scope, AppError> {
    let scope_id = headers
        .get(SCOPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", SCOPE_HEADER)))?;

    if !is_valid_key_segment(scope_id) {
        return Err(AppError::BadRequest(format!(
            "{} must match [A-Za-z0-9_.-]+ and must not start or end with '.'",
            SCOPE_HEADER
        )));
    }
    Ok(Scope::new(scope_id))
}

fn video_params_from_headers(
    headers: &HeaderMap,
) -> Result<Option<VideoProcessingParams>, AppError> {
    let Some(raw) = headers.get(VIDEO_PARAMS_HEADER) else {
        return Ok(None);
    };
    let raw = raw.to_str().map_err(|_| {
        AppError::BadRequest(format!("{} must be valid UTF-8", VIDEO_PARAMS_HEADER))
    })?;
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("Malformed {}: {}", VIDEO_PARAMS_HEADER, e)))
}
