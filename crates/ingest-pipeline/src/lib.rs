//! # 上传处理管线
//!
//! 暂存上传文件，按类型分派（单个DICOM或zip压缩包），依次执行
//! 读取 → 校验 → 匿名化 → 像素提取 → 存储 → 元数据交付，并汇总结果。

pub mod archive;
pub mod metadata;
pub mod orchestrator;
pub mod state_machine;

pub use metadata::{InMemoryMetadataSink, JsonLinesMetadataSink, MetadataSink};
pub use orchestrator::{IngestionOrchestrator, UploadKind, UploadOutcome};
pub use state_machine::{IngestEvent, IngestState, IngestStateMachine, ItemProgress};
