//! # DICOM处理模块
//!
//! 解析、校验、匿名化上传的DICOM文件，并把像素数据提取成独立的数值数组。

pub mod anonymizer;
pub mod extractor;
pub mod npy;
pub mod reader;
pub mod transfer_syntax;
pub mod validator;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

pub use anonymizer::{AnonymizationReport, AnonymizedObject, DicomAnonymizer, REDACTION_TOKEN};
pub use extractor::{PixelArtifact, PixelExtractor, PixelSamples};
pub use reader::{DicomReader, ParsedDicomObject};
pub use transfer_syntax::TransferSyntaxManager;
pub use validator::{DicomValidator, ValidationReport};
