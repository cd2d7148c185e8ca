//! 配置管理
//!
//! 默认值 → 可选的TOML配置文件 → 环境变量 (`INGEST__STORAGE__PIXEL_DIR` 等)。

use crate::error::{IngestError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 上传服务完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 校验配置
    pub validation: ValidationConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 单次上传的最大字节数
    pub max_upload_bytes: usize,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 上传文件的临时暂存目录
    pub staging_dir: PathBuf,
    /// 匿名化DICOM文件目录
    pub anonymized_dir: PathBuf,
    /// 像素数组目录
    pub pixel_dir: PathBuf,
    /// 元数据记录文件 (JSON lines)
    pub metadata_log: PathBuf,
}

/// 校验配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// 为 true 时拒绝不在词表中的模态，否则只记录警告
    pub strict_modality: bool,
    /// 已知模态词表
    pub allowed_modalities: Vec<String>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别 / EnvFilter 表达式
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("/tmp/staging"),
            anonymized_dir: PathBuf::from("/tmp/uploads"),
            pixel_dir: PathBuf::from("/tmp/processed"),
            metadata_log: PathBuf::from("/tmp/processed/metadata.jsonl"),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_modality: false,
            allowed_modalities: ["CT", "MR", "XR", "US", "NM", "PT", "DX", "MG", "CR"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl IngestConfig {
    /// 加载配置；`config_path` 给出时该文件必须存在
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = Config::try_from(&IngestConfig::default())
            .map_err(|e| IngestError::Config(e.to_string()))?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("INGEST")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("validation.allowed_modalities")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| IngestError::Config(e.to_string()))?;
        let config: IngestConfig = settings
            .try_deserialize()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(IngestError::Config("server.port cannot be 0".to_string()));
        }
        if self.storage.anonymized_dir == self.storage.pixel_dir {
            return Err(IngestError::Config(
                "storage.anonymized_dir and storage.pixel_dir must differ".to_string(),
            ));
        }
        if self.validation.strict_modality && self.validation.allowed_modalities.is_empty() {
            return Err(IngestError::Config(
                "validation.allowed_modalities cannot be empty when strict_modality is set"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
