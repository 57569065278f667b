use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::db::AppState;
use crate::error::{AppError, Result};

/// Serve a contract kept by the in-memory store. With S3 configured the
/// contract URLs point at the bucket and this route has nothing to serve.
pub async fn get_contract_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response> {
    let blob = state
        .contract_files
        .as_ref()
        .and_then(|store| store.get(&path))
        .ok_or_else(|| AppError::NotFound(format!("contract {}", path)))?;

    Ok(([(header::CONTENT_TYPE, blob.content_type)], blob.bytes).into_response())
}
