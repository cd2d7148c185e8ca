//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 上传的原始文件（仅在请求期间存在）
#[derive(Debug, Clone)]
pub struct UploadedBlob {
    /// 客户端声明的文件名，用于按扩展名分派
    pub filename: String,
    /// 文件内容
    pub bytes: Vec<u8>,
}

impl UploadedBlob {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// 一个已存储实例的两个产物路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// 匿名化后的DICOM文件
    pub anonymized_path: PathBuf,
    /// 像素数组文件 (.npy)
    pub pixel_path: PathBuf,
}

/// 单个文件的处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadResultItem {
    Stored {
        /// SOP实例UID
        identifier: String,
        anonymized_path: PathBuf,
        pixel_path: PathBuf,
    },
    Failed {
        filename: String,
        error: String,
    },
}

impl UploadResultItem {
    pub fn stored(identifier: impl Into<String>, paths: ArtifactPaths) -> Self {
        UploadResultItem::Stored {
            identifier: identifier.into(),
            anonymized_path: paths.anonymized_path,
            pixel_path: paths.pixel_path,
        }
    }

    pub fn failed(filename: impl Into<String>, error: impl ToString) -> Self {
        UploadResultItem::Failed {
            filename: filename.into(),
            error: error.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, UploadResultItem::Failed { .. })
    }

    /// 错误信息（仅失败项）
    pub fn error(&self) -> Option<&str> {
        match self {
            UploadResultItem::Failed { error, .. } => Some(error),
            UploadResultItem::Stored { .. } => None,
        }
    }
}

/// 压缩包上传的汇总结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub message: String,
    pub data: Vec<UploadResultItem>,
}

impl BatchResult {
    pub fn failure_count(&self) -> usize {
        self.data.iter().filter(|item| item.is_failure()).count()
    }

    pub fn success_count(&self) -> usize {
        self.data.len() - self.failure_count()
    }
}

/// 交给外部持久化组件的精简元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicomMetadataRecord {
    pub modality: Option<String>,
    pub sop_class_uid: Option<String>,
    pub manufacturer: Option<String>,
    pub rows: Option<u32>,
    pub columns: Option<u32>,
    pub bits_allocated: Option<u32>,
    pub photometric_interpretation: Option<String>,
    pub transfer_syntax_uid: Option<String>,
    /// 像素数组产物路径
    pub file_path: PathBuf,
}

/// 已存储实例的列表条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub filename: String,
    pub sop_uid: String,
    pub uploaded_at: Option<DateTime<Utc>>,
}
