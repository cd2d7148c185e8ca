//! HTTP处理器

use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Json, Response},
};
use ingest_core::{BatchResult, StoredEntry, UploadedBlob};
use serde_json::json;
use tracing::{info, info_span};
use uuid::Uuid;

/// 上传表单中的文件字段名
pub const UPLOAD_FIELD: &str = "file";

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 在阻塞线程池中执行同步的管线操作
async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> ingest_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ApiError::Internal(format!("pipeline task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// 上传单个DICOM文件或zip压缩包
pub async fn upload_dicom(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchResult>, ApiError> {
    let request_id = Uuid::new_v4();

    let mut blob = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("upload field has no filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        blob = Some(UploadedBlob::new(filename, bytes.to_vec()));
        break;
    }
    let blob = blob.ok_or_else(|| {
        ApiError::BadRequest(format!("missing multipart field '{}'", UPLOAD_FIELD))
    })?;
    info!("upload {} received: {}", request_id, blob.filename);

    let orchestrator = state.orchestrator.clone();
    let span = info_span!("upload", %request_id);
    let outcome = run_blocking(move || {
        let _entered = span.enter();
        orchestrator.ingest(blob)
    })
    .await?;
    Ok(Json(outcome.into_batch()))
}

/// 已存储实例列表
pub async fn list_uploads(
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredEntry>>, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let entries = run_blocking(move || orchestrator.entries()).await?;
    Ok(Json(entries))
}

/// 下载匿名化后的DICOM文件
pub async fn get_upload(
    State(state): State<AppState>,
    Path(sop_uid): Path<String>,
) -> Result<Response, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let lookup = sop_uid.clone();
    let paths = run_blocking(move || orchestrator.locate(&lookup)).await?;
    let bytes = tokio::fs::read(&paths.anonymized_path)
        .await
        .map_err(|e| ApiError::from(ingest_core::IngestError::UnexpectedIo(e)))?;

    let disposition =
        HeaderValue::from_str(&format!("attachment; filename=\"{}_anon.dcm\"", sop_uid))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/dicom")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// 删除一个实例的两个产物
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(sop_uid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let target = sop_uid.clone();
    run_blocking(move || orchestrator.delete(&target)).await?;

    info!("deleted upload {}", sop_uid);
    Ok(Json(json!({
        "message": format!("{}_anon.dcm deleted", sop_uid)
    })))
}
