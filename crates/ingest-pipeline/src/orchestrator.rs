//! 上传处理协调器
//!
//! 单个 `.dcm` 文件的错误直接返回给调用方；压缩包中每个条目的错误记录在结果里，
//! 只有压缩包本身无法展开时整个批次才失败。

use crate::archive;
use crate::metadata::MetadataSink;
use crate::state_machine::{IngestEvent, IngestStateMachine, ItemProgress};
use ingest_core::{
    ArtifactPaths, BatchResult, IngestConfig, IngestError, Result, StoredEntry, UploadResultItem,
    UploadedBlob,
};
use ingest_dicom::{DicomAnonymizer, DicomReader, DicomValidator, PixelExtractor};
use ingest_storage::ArtifactStore;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// 上传文件的类型，由扩展名决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Dicom,
    Archive,
}

impl UploadKind {
    /// 按扩展名分类（不区分大小写）
    pub fn classify(filename: &str) -> Result<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".dcm") {
            Ok(UploadKind::Dicom)
        } else if lower.ends_with(".zip") {
            Ok(UploadKind::Archive)
        } else {
            Err(IngestError::UnsupportedFileType(filename.to_string()))
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            UploadKind::Dicom => ".dcm",
            UploadKind::Archive => ".zip",
        }
    }
}

/// 一次上传的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Single(UploadResultItem),
    Batch(BatchResult),
}

impl UploadOutcome {
    /// 统一成 `{message, data}` 形式
    pub fn into_batch(self) -> BatchResult {
        match self {
            UploadOutcome::Single(item) => BatchResult {
                message: "DICOM file processed successfully".to_string(),
                data: vec![item],
            },
            UploadOutcome::Batch(batch) => batch,
        }
    }
}

/// 上传处理协调器
pub struct IngestionOrchestrator {
    staging_dir: PathBuf,
    reader: DicomReader,
    validator: DicomValidator,
    anonymizer: DicomAnonymizer,
    extractor: PixelExtractor,
    store: ArtifactStore,
    metadata_sink: Arc<dyn MetadataSink>,
    state_machine: IngestStateMachine,
}

impl IngestionOrchestrator {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        validator: DicomValidator,
        store: ArtifactStore,
        metadata_sink: Arc<dyn MetadataSink>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            reader: DicomReader::new(),
            validator,
            anonymizer: DicomAnonymizer::new(),
            extractor: PixelExtractor::new(),
            store,
            metadata_sink,
            state_machine: IngestStateMachine::new(),
        }
    }

    /// 从配置构造
    pub fn from_config(config: &IngestConfig, metadata_sink: Arc<dyn MetadataSink>) -> Self {
        Self::new(
            config.storage.staging_dir.clone(),
            DicomValidator::from_config(&config.validation),
            ArtifactStore::new(
                config.storage.anonymized_dir.clone(),
                config.storage.pixel_dir.clone(),
            ),
            metadata_sink,
        )
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// 处理一次上传
    pub fn ingest(&self, blob: UploadedBlob) -> Result<UploadOutcome> {
        let kind = UploadKind::classify(&blob.filename)?;
        info!("received upload {} ({:?}, {} bytes)", blob.filename, kind, blob.bytes.len());

        let staged = self.stage(&blob, kind)?;
        match kind {
            UploadKind::Dicom => self
                .process_file(staged.path(), &blob.filename)
                .map(UploadOutcome::Single),
            UploadKind::Archive => self
                .process_archive(staged.path(), &blob.filename)
                .map(UploadOutcome::Batch),
        }
        // staged 在此处被删除
    }

    /// 写入随机命名的暂存文件
    fn stage(&self, blob: &UploadedBlob, kind: UploadKind) -> Result<tempfile::NamedTempFile> {
        fs::create_dir_all(&self.staging_dir)?;
        let mut staged = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(kind.suffix())
            .tempfile_in(&self.staging_dir)?;
        staged.write_all(&blob.bytes)?;
        staged.flush()?;
        Ok(staged)
    }

    /// 对单个已暂存的DICOM文件执行完整流程
    pub fn process_file(&self, path: &Path, label: &str) -> Result<UploadResultItem> {
        let mut progress = ItemProgress::new(&self.state_machine, label);
        let result = self.run_pipeline(path, &mut progress);
        if let Err(err) = &result {
            progress.fail(err);
        }
        result
    }

    fn run_pipeline(
        &self,
        path: &Path,
        progress: &mut ItemProgress<'_>,
    ) -> Result<UploadResultItem> {
        progress.advance(IngestEvent::Staged)?;

        let parsed = self.reader.parse(path)?;
        progress.advance(IngestEvent::Parsed)?;

        let report = self.validator.validate(&parsed)?;
        progress.advance(IngestEvent::Validated)?;
        let identifier = parsed
            .sop_instance_uid()
            .ok_or_else(|| IngestError::MissingRequiredTag(vec!["SOPInstanceUID".to_string()]))?;
        if report.has_warnings() {
            info!("{}: {} validation warnings", identifier, report.warning_count());
        }

        let anonymized = self.anonymizer.anonymize(parsed);
        progress.advance(IngestEvent::Anonymized)?;

        let pixels = self.extractor.extract(anonymized.as_parsed())?;
        progress.advance(IngestEvent::Extracted)?;

        let paths = self.store.store(&identifier, &anonymized, &pixels)?;
        progress.advance(IngestEvent::Stored)?;

        let record = anonymized.as_parsed().metadata_record(&paths.pixel_path);
        self.metadata_sink.store_metadata(&record)?;
        progress.advance(IngestEvent::MetadataRecorded)?;

        info!("{} ingested as {}", path.display(), identifier);
        Ok(UploadResultItem::stored(identifier, paths))
    }

    /// 处理已暂存的压缩包，逐个条目顺序执行
    pub fn process_archive(&self, path: &Path, label: &str) -> Result<BatchResult> {
        let mut expanded = archive::expand(path, label, &self.staging_dir)?;

        let entries = expanded.take_entries();
        let mut data = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = entry
                .extracted
                .and_then(|extracted| self.process_file(&extracted, &entry.name));
            let item = match result {
                Ok(item) => item,
                Err(err) => {
                    warn!("archive {} entry {} failed: {}", label, entry.name, err);
                    UploadResultItem::failed(entry.name, err)
                }
            };
            data.push(item);
        }
        drop(expanded);

        let mut batch = BatchResult {
            message: String::new(),
            data,
        };
        batch.message = format!(
            "Processed {} files from {}: {} stored, {} failed",
            batch.data.len(),
            label,
            batch.success_count(),
            batch.failure_count()
        );
        info!("{}", batch.message);
        Ok(batch)
    }

    pub fn delete(&self, identifier: &str) -> Result<()> {
        self.store.delete(identifier)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    pub fn entries(&self) -> Result<Vec<StoredEntry>> {
        self.store.entries()
    }

    pub fn locate(&self, identifier: &str) -> Result<ArtifactPaths> {
        self.store.locate(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InMemoryMetadataSink;
    use dicom::dictionary_std::tags;
    use ingest_core::DicomMetadataRecord;
    use ingest_dicom::fixtures::DicomFixture;
    use ingest_dicom::REDACTION_TOKEN;
    use std::fs::File;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    struct Harness {
        root: TempDir,
        sink: Arc<InMemoryMetadataSink>,
        orchestrator: IngestionOrchestrator,
    }

    impl Harness {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let sink = Arc::new(InMemoryMetadataSink::new());
            let orchestrator = IngestionOrchestrator::new(
                root.path().join("staging"),
                DicomValidator::new(),
                ArtifactStore::new(root.path().join("uploads"), root.path().join("processed")),
                sink.clone(),
            );
            Self {
                root,
                sink,
                orchestrator,
            }
        }

        fn dir_len(&self, name: &str) -> usize {
            fs::read_dir(self.root.path().join(name))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }

        fn zip(&self, entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
            let path = self.root.path().join("build.zip");
            let mut writer = ZipWriter::new(File::create(&path).unwrap());
            for (name, data) in entries {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
            fs::read(path).unwrap()
        }
    }

    struct FailingSink;

    impl MetadataSink for FailingSink {
        fn store_metadata(&self, _record: &DicomMetadataRecord) -> Result<()> {
            Err(IngestError::PersistenceFailure("database unavailable".to_string()))
        }
    }

    fn single(outcome: UploadOutcome) -> UploadResultItem {
        match outcome {
            UploadOutcome::Single(item) => item,
            other => panic!("expected single outcome, got {other:?}"),
        }
    }

    fn batch(outcome: UploadOutcome) -> BatchResult {
        match outcome {
            UploadOutcome::Batch(batch) => batch,
            other => panic!("expected batch outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(UploadKind::classify("a.dcm").unwrap(), UploadKind::Dicom);
        assert_eq!(UploadKind::classify("A.DCM").unwrap(), UploadKind::Dicom);
        assert_eq!(UploadKind::classify("b.Zip").unwrap(), UploadKind::Archive);
        assert!(matches!(
            UploadKind::classify("scan.png"),
            Err(IngestError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_single_file_success() {
        let h = Harness::new();
        let item = single(
            h.orchestrator
                .ingest(UploadedBlob::new("CT.DCM", DicomFixture::new().to_bytes()))
                .unwrap(),
        );

        let UploadResultItem::Stored {
            identifier,
            anonymized_path,
            pixel_path,
        } = item
        else {
            panic!("expected stored item");
        };
        assert_eq!(identifier, DicomFixture::DEFAULT_SOP_INSTANCE_UID);
        assert!(anonymized_path.is_file());
        assert!(pixel_path.is_file());

        let reread = DicomReader::new().parse(&anonymized_path).unwrap();
        assert_eq!(
            reread.string(tags::PATIENT_NAME).as_deref(),
            Some(REDACTION_TOKEN)
        );
        let bytes = fs::read(&anonymized_path).unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains(DicomFixture::PATIENT_NAME));

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_path, pixel_path);
        assert_eq!(records[0].modality.as_deref(), Some("CT"));

        assert_eq!(h.dir_len("staging"), 0);
    }

    #[test]
    fn test_unsupported_type_does_no_io() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .ingest(UploadedBlob::new("notes.txt", b"hello".to_vec()))
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType(_)));
        assert!(!h.root.path().join("staging").exists());
    }

    #[test]
    fn test_missing_required_tag_writes_nothing() {
        let h = Harness::new();
        let bytes = DicomFixture::new()
            .without(tags::MODALITY)
            .to_bytes();
        let err = h
            .orchestrator
            .ingest(UploadedBlob::new("ct.dcm", bytes))
            .unwrap_err();

        assert!(matches!(err, IngestError::MissingRequiredTag(_)));
        assert!(h.orchestrator.list().unwrap().is_empty());
        assert_eq!(h.dir_len("processed"), 0);
        assert_eq!(h.dir_len("staging"), 0);
        assert!(h.sink.records().is_empty());
    }

    #[test]
    fn test_missing_pixel_payload() {
        let h = Harness::new();
        let bytes = DicomFixture::new()
            .without(tags::PIXEL_DATA)
            .to_bytes();
        let err = h
            .orchestrator
            .ingest(UploadedBlob::new("ct.dcm", bytes))
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingPixelPayload));
    }

    #[test]
    fn test_dimension_mismatch_writes_nothing() {
        let h = Harness::new();
        let bytes = DicomFixture::new().geometry(8, 8, 1, 16).to_bytes();
        let err = h
            .orchestrator
            .ingest(UploadedBlob::new("ct.dcm", bytes))
            .unwrap_err();

        assert!(matches!(err, IngestError::ExtractionFailure(_)));
        assert!(h.orchestrator.list().unwrap().is_empty());
        assert_eq!(h.dir_len("processed"), 0);
    }

    #[test]
    fn test_garbage_dcm_is_invalid_format() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .ingest(UploadedBlob::new("ct.dcm", b"not dicom at all".to_vec()))
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidFormat(_)));
        assert_eq!(h.dir_len("staging"), 0);
    }

    #[test]
    fn test_same_file_twice_overwrites() {
        let h = Harness::new();
        let bytes = DicomFixture::new().to_bytes();
        h.orchestrator
            .ingest(UploadedBlob::new("a.dcm", bytes.clone()))
            .unwrap();
        h.orchestrator
            .ingest(UploadedBlob::new("a.dcm", bytes))
            .unwrap();

        assert_eq!(h.orchestrator.list().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_roundtrip() {
        let h = Harness::new();
        h.orchestrator
            .ingest(UploadedBlob::new("a.dcm", DicomFixture::new().to_bytes()))
            .unwrap();

        h.orchestrator
            .delete(DicomFixture::DEFAULT_SOP_INSTANCE_UID)
            .unwrap();
        assert!(h.orchestrator.list().unwrap().is_empty());
        assert!(matches!(
            h.orchestrator.delete(DicomFixture::DEFAULT_SOP_INSTANCE_UID),
            Err(IngestError::NotFound(_))
        ));
    }

    #[test]
    fn test_metadata_failure_surfaces() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = IngestionOrchestrator::new(
            root.path().join("staging"),
            DicomValidator::new(),
            ArtifactStore::new(root.path().join("uploads"), root.path().join("processed")),
            Arc::new(FailingSink),
        );
        let err = orchestrator
            .ingest(UploadedBlob::new("a.dcm", DicomFixture::new().to_bytes()))
            .unwrap_err();
        assert!(matches!(err, IngestError::PersistenceFailure(_)));
    }

    #[test]
    fn test_batch_partial_failure() {
        let h = Harness::new();
        let archive = h.zip(&[
            ("one.dcm", DicomFixture::new().sop_instance_uid("1.2.3.1").to_bytes()),
            (
                "two.dcm",
                DicomFixture::new()
                    .sop_instance_uid("1.2.3.2")
                    .without(tags::MODALITY)
                    .to_bytes(),
            ),
            ("readme.txt", b"skipped".to_vec()),
            ("nested/three.dcm", DicomFixture::new().sop_instance_uid("1.2.3.3").to_bytes()),
            ("four.dcm", b"garbage".to_vec()),
        ]);

        let result = batch(
            h.orchestrator
                .ingest(UploadedBlob::new("batch.zip", archive))
                .unwrap(),
        );

        assert_eq!(result.data.len(), 4);
        assert_eq!(result.failure_count(), 2);
        assert_eq!(result.success_count(), 2);
        assert_eq!(
            result.data[1],
            UploadResultItem::failed(
                "two.dcm",
                IngestError::MissingRequiredTag(vec!["Modality".to_string()])
            )
        );
        assert!(result.data[3].is_failure());

        let mut listed = h.orchestrator.list().unwrap();
        listed.sort();
        assert_eq!(listed, vec!["1.2.3.1_anon.dcm", "1.2.3.3_anon.dcm"]);
        assert_eq!(h.dir_len("staging"), 0);
    }

    #[test]
    fn test_single_entry_archive_without_pixels() {
        let h = Harness::new();
        let archive = h.zip(&[(
            "only.dcm",
            DicomFixture::new()
                .without(tags::PIXEL_DATA)
                .to_bytes(),
        )]);

        let result = batch(
            h.orchestrator
                .ingest(UploadedBlob::new("batch.zip", archive))
                .unwrap(),
        );

        assert_eq!(result.data.len(), 1);
        let error = result.data[0].error().unwrap();
        assert!(error.contains("PixelData"), "{error}");
        assert!(h.orchestrator.list().unwrap().is_empty());
        assert_eq!(h.dir_len("processed"), 0);
    }

    #[test]
    fn test_corrupt_archive_aborts_batch() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .ingest(UploadedBlob::new("batch.zip", b"definitely not a zip".to_vec()))
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidArchive(_)));
        assert_eq!(h.dir_len("staging"), 0);
    }

    #[test]
    fn test_corrupt_entry_does_not_lose_siblings() {
        let h = Harness::new();
        let good = DicomFixture::new().sop_instance_uid("1.2.3.1").to_bytes();
        let bad = DicomFixture::new().sop_instance_uid("1.2.3.2").to_bytes();

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in [("bad.dcm", &bad), ("good.dcm", &good)] {
            writer.start_file(name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        let mut archive = writer.finish().unwrap().into_inner();
        // 破坏 bad.dcm 的最后一个字节，CRC校验失败
        let at = archive
            .windows(bad.len())
            .position(|window| window == &bad[..])
            .unwrap();
        archive[at + bad.len() - 1] ^= 0xff;

        let result = batch(
            h.orchestrator
                .ingest(UploadedBlob::new("scans.zip", archive))
                .unwrap(),
        );

        assert_eq!(result.data.len(), 2);
        assert!(result.data[0].is_failure());
        let error = result.data[0].error().unwrap();
        assert!(error.contains("bad.dcm"), "{error}");
        assert!(!error.contains("upload-"), "{error}");
        assert_eq!(result.success_count(), 1);
        assert_eq!(h.orchestrator.list().unwrap(), vec!["1.2.3.1_anon.dcm"]);
        assert_eq!(h.dir_len("staging"), 0);
    }

    #[test]
    fn test_invalid_archive_names_uploaded_file() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .ingest(UploadedBlob::new("scans.zip", b"PK garbage".to_vec()))
            .unwrap_err();
        match err {
            IngestError::InvalidArchive(message) => {
                assert!(message.starts_with("scans.zip: "), "{message}")
            }
            other => panic!("expected InvalidArchive, got {other:?}"),
        }
    }

    #[test]
    fn test_into_batch_wraps_single_item() {
        let item = UploadResultItem::failed("x.dcm", "boom");
        let batch = UploadOutcome::Single(item.clone()).into_batch();
        assert_eq!(batch.data, vec![item]);
    }
}
