//! 产物存储管理
//!
//! 每个实例对应两个文件：`{anonymized_dir}/{id}_anon.dcm` 和 `{pixel_dir}/{id}_anon.npy`。
//! 两个文件先写入同目录下的临时文件，都写成功后再依次改名到位。

use crate::locks::IdentifierLocks;
use chrono::{DateTime, Utc};
use ingest_core::utils::is_safe_identifier;
use ingest_core::{ArtifactPaths, IngestError, Result, StoredEntry};
use ingest_dicom::{npy, AnonymizedObject, PixelArtifact};
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// 匿名化DICOM文件后缀
pub const ANONYMIZED_SUFFIX: &str = "_anon.dcm";
/// 像素数组文件后缀
pub const PIXEL_SUFFIX: &str = "_anon.npy";
/// 写入中的临时文件前缀，列表时跳过
const TEMP_PREFIX: &str = ".tmp-";

/// 存储管理器
#[derive(Debug)]
pub struct ArtifactStore {
    anonymized_dir: PathBuf,
    pixel_dir: PathBuf,
    locks: IdentifierLocks,
}

impl ArtifactStore {
    pub fn new(anonymized_dir: impl Into<PathBuf>, pixel_dir: impl Into<PathBuf>) -> Self {
        Self {
            anonymized_dir: anonymized_dir.into(),
            pixel_dir: pixel_dir.into(),
            locks: IdentifierLocks::new(),
        }
    }

    pub fn anonymized_dir(&self) -> &Path {
        &self.anonymized_dir
    }

    pub fn pixel_dir(&self) -> &Path {
        &self.pixel_dir
    }

    /// 标识符对应的两个产物路径（不检查是否存在）
    pub fn paths_for(&self, identifier: &str) -> Result<ArtifactPaths> {
        check_identifier(identifier)?;
        Ok(ArtifactPaths {
            anonymized_path: self
                .anonymized_dir
                .join(format!("{}{}", identifier, ANONYMIZED_SUFFIX)),
            pixel_path: self.pixel_dir.join(format!("{}{}", identifier, PIXEL_SUFFIX)),
        })
    }

    /// 存储一个实例的两个产物，已存在时覆盖
    pub fn store(
        &self,
        identifier: &str,
        anonymized: &AnonymizedObject,
        pixels: &PixelArtifact,
    ) -> Result<ArtifactPaths> {
        let paths = self.paths_for(identifier)?;
        create_dir(&self.anonymized_dir)?;
        create_dir(&self.pixel_dir)?;

        let _guard = self.locks.acquire(identifier)?;

        let anonymized_tmp = temp_file_in(&self.anonymized_dir)?;
        anonymized.write_to_file(anonymized_tmp.path())?;

        let mut pixel_tmp = temp_file_in(&self.pixel_dir)?;
        npy::write_npy(pixels, BufWriter::new(pixel_tmp.as_file_mut()))
            .map_err(|e| persistence_error(pixel_tmp.path(), e))?;

        // 覆盖时先把旧像素文件挪开，失败后可以恢复原来的一对文件
        let backup = self
            .pixel_dir
            .join(format!("{}{}{}", TEMP_PREFIX, identifier, PIXEL_SUFFIX));
        let had_previous = match fs::rename(&paths.pixel_path, &backup) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(persistence_error(&paths.pixel_path, e)),
        };
        let restore = || {
            if had_previous {
                if let Err(e) = fs::rename(&backup, &paths.pixel_path) {
                    error!("failed to restore previous pixel array for {}: {}", identifier, e);
                }
            }
        };

        // 像素文件先到位，列表里出现的实例总有对应的像素文件
        if let Err(e) = pixel_tmp.persist(&paths.pixel_path) {
            restore();
            return Err(persistence_error(&paths.pixel_path, e.error));
        }
        if let Err(e) = anonymized_tmp.persist(&paths.anonymized_path) {
            error!(
                "failed to move anonymized object into place for {}, rolling back pixel array",
                identifier
            );
            let _ = fs::remove_file(&paths.pixel_path);
            restore();
            return Err(persistence_error(&paths.anonymized_path, e.error));
        }
        if had_previous {
            if let Err(e) = fs::remove_file(&backup) {
                warn!("failed to remove previous pixel array {:?}: {}", backup, e);
            }
        }

        info!(
            "stored artifacts for {}: {:?}, {:?}",
            identifier, paths.anonymized_path, paths.pixel_path
        );
        Ok(paths)
    }

    /// 两个产物都存在时返回其路径
    pub fn locate(&self, identifier: &str) -> Result<ArtifactPaths> {
        let paths = self.paths_for(identifier)?;
        if paths.anonymized_path.is_file() && paths.pixel_path.is_file() {
            Ok(paths)
        } else {
            Err(IngestError::NotFound(identifier.to_string()))
        }
    }

    /// 删除一个实例；两个文件必须都存在
    pub fn delete(&self, identifier: &str) -> Result<()> {
        check_identifier(identifier)?;
        let _guard = self.locks.acquire(identifier)?;
        let paths = self.locate(identifier)?;

        fs::remove_file(&paths.anonymized_path)
            .map_err(|e| persistence_error(&paths.anonymized_path, e))?;
        fs::remove_file(&paths.pixel_path).map_err(|e| persistence_error(&paths.pixel_path, e))?;

        info!("deleted artifacts for {}", identifier);
        Ok(())
    }

    /// 匿名化目录下的文件名，顺序取决于文件系统
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.anonymized_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("anonymized dir {:?} does not exist yet", self.anonymized_dir);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    /// 带标识符和上传时间的列表
    pub fn entries(&self) -> Result<Vec<StoredEntry>> {
        let mut entries = Vec::new();
        for filename in self.list()? {
            let path = self.anonymized_dir.join(&filename);
            let uploaded_at = fs::metadata(&path)
                .and_then(|metadata| metadata.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            let sop_uid = filename
                .strip_suffix(ANONYMIZED_SUFFIX)
                .unwrap_or(&filename)
                .to_string();
            entries.push(StoredEntry {
                filename,
                sop_uid,
                uploaded_at,
            });
        }
        Ok(entries)
    }
}

fn check_identifier(identifier: &str) -> Result<()> {
    if is_safe_identifier(identifier) {
        Ok(())
    } else {
        Err(IngestError::InvalidIdentifier(identifier.to_string()))
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| persistence_error(dir, e))
}

/// 临时文件按普通文件的默认权限创建（受umask约束），改名后下游可读
fn temp_file_in(dir: &Path) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir).map_err(|e| persistence_error(dir, e))
}

fn persistence_error(path: &Path, e: io::Error) -> IngestError {
    IngestError::PersistenceFailure(format!("{}: {}", path.display(), e))
}
