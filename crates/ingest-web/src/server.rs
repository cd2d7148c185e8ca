//! Web服务器

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use ingest_pipeline::IngestionOrchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{delete_upload, get_upload, health, list_uploads, upload_dicom};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<IngestionOrchestrator>,
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(
        addr: SocketAddr,
        orchestrator: Arc<IngestionOrchestrator>,
        max_upload_bytes: usize,
    ) -> Self {
        let app = Self::create_app(AppState { orchestrator }, max_upload_bytes);

        Self { addr, app }
    }

    pub fn create_app(state: AppState, max_upload_bytes: usize) -> Router {
        Router::new()
            // 健康检查
            .route("/health", get(health))
            // 上传接口
            .route("/dicoms/uploads", get(list_uploads).post(upload_dicom))
            .route(
                "/dicoms/uploads/:sop_uid",
                get(get_upload).delete(delete_upload),
            )
            .with_state(state)
            // 全局中间件
            .layer(DefaultBodyLimit::max(max_upload_bytes))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start web server: {}", e))?;

        Ok(())
    }
}
