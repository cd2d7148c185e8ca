//! DICOM上传服务主程序

use anyhow::Context;
use clap::Parser;
use ingest_core::IngestConfig;
use ingest_pipeline::{IngestionOrchestrator, JsonLinesMetadataSink};
use ingest_web::WebServer;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// 命令行参数，优先级高于配置文件和环境变量
#[derive(Parser, Debug)]
#[command(name = "ingest-server")]
#[command(about = "DICOM 上传、匿名化与像素提取服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听主机
    #[arg(long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = IngestConfig::load(args.config.as_deref()).context("加载配置失败")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate().context("配置无效")?;

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(config.logging.level.as_str())
        .init();

    info!("启动DICOM上传服务...");
    match args.config.as_deref() {
        Some(path) => info!("配置已加载: {}", path),
        None => info!("配置已加载: 默认值与环境变量"),
    }
    info!("  暂存目录: {:?}", config.storage.staging_dir);
    info!("  匿名化目录: {:?}", config.storage.anonymized_dir);
    info!("  像素目录: {:?}", config.storage.pixel_dir);
    info!("  元数据记录: {:?}", config.storage.metadata_log);
    info!("  严格模态检查: {}", config.validation.strict_modality);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("无效的监听地址: {}:{}", config.server.host, config.server.port))?;

    let sink = Arc::new(JsonLinesMetadataSink::new(config.storage.metadata_log.clone()));
    let orchestrator = Arc::new(IngestionOrchestrator::from_config(&config, sink));
    let server = WebServer::new(addr, orchestrator, config.server.max_upload_bytes);

    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e);
    }

    Ok(())
}
