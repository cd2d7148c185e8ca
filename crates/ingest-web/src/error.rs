//! HTTP错误响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use ingest_core::IngestError;
use serde_json::json;
use tracing::error;

/// 处理器返回的错误
#[derive(Debug)]
pub enum ApiError {
    /// 管线错误，按错误类别映射状态码
    Ingest(IngestError),
    /// 请求本身格式不对（如缺少multipart字段）
    BadRequest(String),
    /// 后台任务异常退出
    Internal(String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::Ingest(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Ingest(IngestError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Ingest(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Ingest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            ApiError::Ingest(err) => err.to_string(),
            ApiError::BadRequest(msg) => msg,
            ApiError::Internal(msg) => msg,
        };
        if status.is_server_error() {
            error!("request failed: {}", error_message);
        }

        let body = Json(json!({
            "error": true,
            "message": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(IngestError::NotFound("1.2.3".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(IngestError::MissingPixelPayload).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(IngestError::UnsupportedFileType("a.png".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(IngestError::ExtractionFailure("x".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(IngestError::PersistenceFailure("x".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
