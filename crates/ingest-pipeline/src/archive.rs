//! zip压缩包展开
//!
//! 把压缩包里的 `.dcm` 条目解到新的临时目录，按压缩包中的顺序返回。
//! 单个条目解压失败只影响该条目；只有中央目录无法读取时整个压缩包才无效。

use ingest_core::{IngestError, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};
use zip::ZipArchive;

/// 压缩包中的单个DICOM条目
#[derive(Debug)]
pub struct ArchiveEntry {
    /// 压缩包内的路径
    pub name: String,
    /// 解压后的文件路径，解压失败时为对应错误
    pub extracted: Result<PathBuf>,
}

impl ArchiveEntry {
    pub fn path(&self) -> Option<&Path> {
        self.extracted.as_deref().ok()
    }
}

/// 展开结果；临时目录随其一起删除
#[derive(Debug)]
pub struct ExpandedArchive {
    dir: TempDir,
    entries: Vec<ArchiveEntry>,
    skipped: Vec<String>,
}

impl ExpandedArchive {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// 取出全部条目，临时目录仍由 `self` 持有
    pub fn take_entries(&mut self) -> Vec<ArchiveEntry> {
        std::mem::take(&mut self.entries)
    }

    /// 被跳过的非DICOM条目
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}

/// 条目名是否以 `.dcm` 结尾（不区分大小写）
pub fn is_dicom_entry(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("dcm"))
        .unwrap_or(false)
}

/// 展开压缩包
///
/// `label` 是用户上传时的文件名，用于错误信息。压缩包本身无法读取时返回
/// `InvalidArchive`，此时不会产生任何条目。
pub fn expand(archive_path: &Path, label: &str, scratch_dir: &Path) -> Result<ExpandedArchive> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| invalid_archive(label, e))?;

    fs::create_dir_all(scratch_dir)?;
    let dir = tempfile::Builder::new()
        .prefix("archive-")
        .tempdir_in(scratch_dir)?;

    let mut entries = Vec::new();
    let mut skipped = Vec::new();
    for index in 0..archive.len() {
        // 只读条目头，跳过的条目不解压也不解密
        let (name, relative) = {
            let raw = archive
                .by_index_raw(index)
                .map_err(|e| invalid_archive(label, e))?;
            if raw.is_dir() {
                continue;
            }
            (raw.name().to_string(), raw.enclosed_name())
        };

        let Some(relative) = relative else {
            warn!("skipping archive entry with unsafe path: {}", name);
            skipped.push(name);
            continue;
        };
        if !is_dicom_entry(&name) {
            warn!("skipping non-DICOM archive entry: {}", name);
            skipped.push(name);
            continue;
        }

        let target = dir.path().join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&target)?;
        let copied = archive
            .by_index(index)
            .map_err(|e| e.to_string())
            .and_then(|mut entry| {
                io::copy(&mut entry, &mut output).map_err(|e| e.to_string())
            });
        drop(output);

        let extracted = match copied {
            Ok(_) => Ok(target),
            Err(reason) => {
                warn!("archive {} entry {} is unreadable: {}", label, name, reason);
                let _ = fs::remove_file(&target);
                Err(IngestError::InvalidArchive(format!("{}: {}", name, reason)))
            }
        };
        entries.push(ArchiveEntry { name, extracted });
    }

    info!(
        "expanded archive {}: {} DICOM entries, {} skipped",
        label,
        entries.len(),
        skipped.len()
    );
    Ok(ExpandedArchive {
        dir,
        entries,
        skipped,
    })
}

fn invalid_archive(label: &str, e: impl std::fmt::Display) -> IngestError {
    IngestError::InvalidArchive(format!("{}: {}", label, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    const LOCAL_HEADER: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
    const CENTRAL_HEADER: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(name.trim_end_matches('/'), SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    /// 不压缩写入，条目数据在文件中原样出现
    fn stored_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// 在本地头和中央目录头中同时改写某个条目的16位字段
    fn patch_header_field(
        bytes: &mut [u8],
        name: &str,
        local_offset: usize,
        central_offset: usize,
        value: u16,
    ) {
        let name = name.as_bytes();
        let mut patched = 0;
        for pos in 0..bytes.len().saturating_sub(4) {
            let (offset, name_at) = if bytes[pos..pos + 4] == LOCAL_HEADER {
                (local_offset, pos + 30)
            } else if bytes[pos..pos + 4] == CENTRAL_HEADER {
                (central_offset, pos + 46)
            } else {
                continue;
            };
            if bytes.get(name_at..name_at + name.len()) == Some(name) {
                bytes[pos + offset..pos + offset + 2].copy_from_slice(&value.to_le_bytes());
                patched += 1;
            }
        }
        assert_eq!(patched, 2, "entry {:?} not found", String::from_utf8_lossy(name));
    }

    fn find(haystack: &[u8], needle: &[u8]) -> usize {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
            .unwrap()
    }

    #[test]
    fn test_expand_keeps_archive_order_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("batch.zip");
        write_zip(
            &archive,
            &[
                ("b.dcm", b"second-in-name-first-in-archive"),
                ("notes.txt", b"ignored"),
                ("series/", b""),
                ("series/A.DCM", b"nested"),
            ],
        );

        let expanded = expand(&archive, "batch.zip", dir.path()).unwrap();
        let names: Vec<_> = expanded.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.dcm", "series/A.DCM"]);
        assert_eq!(expanded.skipped(), ["notes.txt".to_string()]);
        assert_eq!(
            fs::read(expanded.entries()[1].path().unwrap()).unwrap(),
            b"nested".to_vec()
        );
    }

    #[test]
    fn test_temp_dir_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("batch.zip");
        write_zip(&archive, &[("a.dcm", b"x")]);

        let expanded = expand(&archive, "batch.zip", dir.path()).unwrap();
        let expanded_dir = expanded.dir().to_path_buf();
        assert!(expanded_dir.exists());
        drop(expanded);
        assert!(!expanded_dir.exists());
    }

    #[test]
    fn test_corrupt_archive_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"PK not really a zip").unwrap();

        let err = expand(&archive, "scans.zip", dir.path()).unwrap_err();
        match err {
            IngestError::InvalidArchive(message) => assert!(message.starts_with("scans.zip: ")),
            other => panic!("expected InvalidArchive, got {other:?}"),
        }
    }

    #[test]
    fn test_unreadable_skipped_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = stored_zip(&[
            ("good.dcm", b"good-payload"),
            ("readme.txt", b"unsupported method"),
            ("secret.txt", b"encrypted"),
        ]);
        // 压缩方法字段：本地头偏移8，中央目录偏移10
        patch_header_field(&mut bytes, "readme.txt", 8, 10, 97);
        // 通用标志位第0位表示加密：本地头偏移6，中央目录偏移8
        patch_header_field(&mut bytes, "secret.txt", 6, 8, 1);
        let archive = dir.path().join("batch.zip");
        fs::write(&archive, bytes).unwrap();

        let expanded = expand(&archive, "batch.zip", dir.path()).unwrap();
        assert_eq!(expanded.entries().len(), 1);
        assert_eq!(
            fs::read(expanded.entries()[0].path().unwrap()).unwrap(),
            b"good-payload".to_vec()
        );
        assert_eq!(
            expanded.skipped(),
            ["readme.txt".to_string(), "secret.txt".to_string()]
        );
    }

    #[test]
    fn test_corrupt_entry_fails_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = stored_zip(&[
            ("bad.dcm", b"payload-with-checksum"),
            ("good.dcm", b"good-payload"),
        ]);
        let at = find(&bytes, b"payload-with-checksum");
        bytes[at] ^= 0xff;
        let archive = dir.path().join("batch.zip");
        fs::write(&archive, bytes).unwrap();

        let expanded = expand(&archive, "batch.zip", dir.path()).unwrap();
        let entries = expanded.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "bad.dcm");
        assert!(matches!(
            entries[0].extracted,
            Err(IngestError::InvalidArchive(ref message)) if message.starts_with("bad.dcm: ")
        ));
        assert!(!expanded.dir().join("bad.dcm").exists());
        assert_eq!(
            fs::read(entries[1].path().unwrap()).unwrap(),
            b"good-payload".to_vec()
        );
    }

    #[test]
    fn test_is_dicom_entry() {
        assert!(is_dicom_entry("a.dcm"));
        assert!(is_dicom_entry("dir/B.DCM"));
        assert!(!is_dicom_entry("a.dcm.txt"));
        assert!(!is_dicom_entry("dcm"));
    }
}
