//! # 产物存储模块
//!
//! 按SOP实例UID保存匿名化DICOM文件和像素数组文件。

pub mod locks;
pub mod storage;

pub use storage::ArtifactStore;
