//! 错误定义模块

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 上传管线统一错误类型
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("不支持的文件类型: '{0}'，只允许 .dcm 或 .zip")]
    UnsupportedFileType(String),

    #[error("无效的DICOM格式: {0}")]
    InvalidFormat(String),

    #[error("缺少必需标签: {}", .0.join(", "))]
    MissingRequiredTag(Vec<String>),

    #[error("缺少像素数据: missing 'PixelData' (7FE0,0010) element")]
    MissingPixelPayload,

    #[error("未知或无效的模态: {0}")]
    UnknownModality(String),

    #[error("无效的实例标识符: '{0}'")]
    InvalidIdentifier(String),

    #[error("像素数据提取失败: {0}")]
    ExtractionFailure(String),

    #[error("持久化失败: {0}")]
    PersistenceFailure(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("压缩包无效: {0}")]
    InvalidArchive(String),

    #[error("IO错误: {0}")]
    UnexpectedIo(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

/// 失败类别，用于状态机中的 `Failed(kind)` 终态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureKind {
    UnsupportedFileType,
    InvalidFormat,
    MissingRequiredTag,
    MissingPixelPayload,
    UnknownModality,
    InvalidIdentifier,
    ExtractionFailure,
    PersistenceFailure,
    NotFound,
    InvalidArchive,
    UnexpectedIo,
    Internal,
}

impl IngestError {
    /// 错误对应的失败类别
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::UnsupportedFileType(_) => FailureKind::UnsupportedFileType,
            IngestError::InvalidFormat(_) => FailureKind::InvalidFormat,
            IngestError::MissingRequiredTag(_) => FailureKind::MissingRequiredTag,
            IngestError::MissingPixelPayload => FailureKind::MissingPixelPayload,
            IngestError::UnknownModality(_) => FailureKind::UnknownModality,
            IngestError::InvalidIdentifier(_) => FailureKind::InvalidIdentifier,
            IngestError::ExtractionFailure(_) => FailureKind::ExtractionFailure,
            IngestError::PersistenceFailure(_) => FailureKind::PersistenceFailure,
            IngestError::NotFound(_) => FailureKind::NotFound,
            IngestError::InvalidArchive(_) => FailureKind::InvalidArchive,
            IngestError::UnexpectedIo(_) => FailureKind::UnexpectedIo,
            IngestError::Config(_) | IngestError::InvalidStateTransition { .. } => {
                FailureKind::Internal
            }
        }
    }

    /// 是否为客户端错误（输入本身有问题）
    ///
    /// 提取失败属于服务端处理错误：输入通过了结构检查，但无法安全转换。
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::UnsupportedFileType(_)
                | IngestError::InvalidFormat(_)
                | IngestError::MissingRequiredTag(_)
                | IngestError::MissingPixelPayload
                | IngestError::UnknownModality(_)
                | IngestError::InvalidIdentifier(_)
                | IngestError::NotFound(_)
                | IngestError::InvalidArchive(_)
        )
    }
}

/// 上传管线统一结果类型
pub type Result<T> = std::result::Result<T, IngestError>;
