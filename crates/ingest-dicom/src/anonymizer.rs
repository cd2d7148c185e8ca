//! DICOM匿名化
//!
//! 用固定标记替换可识别患者身份的字段。缺失的字段直接跳过，匿名化本身不会失败。

use crate::reader::ParsedDicomObject;
use dicom::core::{DataElement, PrimitiveValue, Tag};
use dicom::dictionary_std::tags;
use ingest_core::{IngestError, Result};
use std::path::Path;
use tracing::info;

/// 替换后的字面值
pub const REDACTION_TOKEN: &str = "ANONYMIZED";

/// 需要匿名化的字段
pub const PHI_TAGS: [(Tag, &str); 4] = [
    (tags::PATIENT_NAME, "PatientName"),
    (tags::INSTITUTION_NAME, "InstitutionName"),
    (tags::REFERRING_PHYSICIAN_NAME, "ReferringPhysicianName"),
    (tags::PATIENT_ADDRESS, "PatientAddress"),
];

/// DICOM匿名化器
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomAnonymizer;

impl DicomAnonymizer {
    pub fn new() -> Self {
        Self
    }

    /// 匿名化DICOM对象
    pub fn anonymize(&self, mut parsed: ParsedDicomObject) -> AnonymizedObject {
        let mut report = AnonymizationReport::default();
        let object = parsed.object_mut();

        for (tag, keyword) in PHI_TAGS {
            // 沿用原元素的VR
            let Ok(vr) = object.element(tag).map(|element| element.vr()) else {
                continue;
            };
            object.put(DataElement::new(tag, vr, PrimitiveValue::from(REDACTION_TOKEN)));
            info!(target: "audit", field = keyword, "[Anonymizer] 字段已匿名化");
            report.redacted.push(keyword);
        }

        AnonymizedObject { parsed, report }
    }
}

/// 匿名化记录
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnonymizationReport {
    /// 被替换的字段关键字
    pub redacted: Vec<&'static str>,
}

/// 匿名化后的DICOM对象
#[derive(Debug, Clone)]
pub struct AnonymizedObject {
    parsed: ParsedDicomObject,
    report: AnonymizationReport,
}

impl AnonymizedObject {
    pub fn as_parsed(&self) -> &ParsedDicomObject {
        &self.parsed
    }

    pub fn report(&self) -> &AnonymizationReport {
        &self.report
    }

    /// 以DICOM Part 10格式写入文件
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        self.parsed
            .object()
            .write_to_file(path)
            .map_err(|e| IngestError::PersistenceFailure(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DicomFixture;
    use crate::reader::DicomReader;

    fn anonymize(fixture: DicomFixture) -> AnonymizedObject {
        DicomAnonymizer::new().anonymize(ParsedDicomObject::new(fixture.build(), "fixture.dcm"))
    }

    #[test]
    fn test_all_phi_fields_redacted() {
        let anonymized = anonymize(DicomFixture::new());
        let parsed = anonymized.as_parsed();

        for (tag, _) in PHI_TAGS {
            assert_eq!(parsed.string(tag).as_deref(), Some(REDACTION_TOKEN));
        }
        assert_eq!(
            anonymized.report().redacted,
            vec!["PatientName", "InstitutionName", "ReferringPhysicianName", "PatientAddress"]
        );
    }

    #[test]
    fn test_absent_fields_are_skipped() {
        let anonymized = anonymize(
            DicomFixture::new()
                .without(tags::PATIENT_ADDRESS)
                .without(tags::INSTITUTION_NAME),
        );
        assert!(!anonymized.as_parsed().has_element(tags::PATIENT_ADDRESS));
        assert_eq!(
            anonymized.report().redacted,
            vec!["PatientName", "ReferringPhysicianName"]
        );
    }

    #[test]
    fn test_other_fields_untouched() {
        let anonymized = anonymize(DicomFixture::new());
        let parsed = anonymized.as_parsed();
        assert_eq!(parsed.modality().as_deref(), Some("CT"));
        assert_eq!(
            parsed.sop_instance_uid().as_deref(),
            Some(DicomFixture::DEFAULT_SOP_INSTANCE_UID)
        );
        assert!(parsed.pixel_value().is_some());
    }

    #[test]
    fn test_written_file_holds_no_original_phi() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anon.dcm");
        anonymize(DicomFixture::new()).write_to_file(&path).unwrap();

        let reread = DicomReader::new().parse(&path).unwrap();
        assert_eq!(
            reread.string(tags::PATIENT_NAME).as_deref(),
            Some(REDACTION_TOKEN)
        );

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        for original in [
            DicomFixture::PATIENT_NAME,
            DicomFixture::INSTITUTION_NAME,
            DicomFixture::REFERRING_PHYSICIAN_NAME,
            DicomFixture::PATIENT_ADDRESS,
        ] {
            assert!(!text.contains(original), "found {original} in output");
        }
    }
}
