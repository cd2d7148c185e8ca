//! 元数据交付
//!
//! 存储成功后，把精简的DICOM元数据交给外部持久化组件。

use ingest_core::{DicomMetadataRecord, IngestError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// 元数据持久化接口
pub trait MetadataSink: Send + Sync {
    /// 失败时返回 `PersistenceFailure`
    fn store_metadata(&self, record: &DicomMetadataRecord) -> Result<()>;
}

/// 内存中的元数据记录
#[derive(Debug, Default)]
pub struct InMemoryMetadataSink {
    records: Mutex<Vec<DicomMetadataRecord>>,
}

impl InMemoryMetadataSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DicomMetadataRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl MetadataSink for InMemoryMetadataSink {
    fn store_metadata(&self, record: &DicomMetadataRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|e| IngestError::PersistenceFailure(e.to_string()))?
            .push(record.clone());
        Ok(())
    }
}

/// 以JSON Lines格式追加写入文件
#[derive(Debug)]
pub struct JsonLinesMetadataSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesMetadataSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataSink for JsonLinesMetadataSink {
    fn store_metadata(&self, record: &DicomMetadataRecord) -> Result<()> {
        let failure = |e: std::io::Error| {
            IngestError::PersistenceFailure(format!("{}: {}", self.path.display(), e))
        };

        let mut line = serde_json::to_string(record)
            .map_err(|e| IngestError::PersistenceFailure(e.to_string()))?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| IngestError::PersistenceFailure(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(failure)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(failure)?;
        file.write_all(line.as_bytes()).map_err(failure)?;

        info!("metadata recorded for {:?}", record.file_path);
        Ok(())
    }
}
