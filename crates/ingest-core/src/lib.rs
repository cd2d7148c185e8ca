//! # Ingest Core
//!
//! 上传管线的核心模块，提供错误定义、数据模型、配置加载和通用工具。

pub mod config;
pub mod error;
pub mod models;
pub mod utils;

pub use config::IngestConfig;
pub use error::{FailureKind, IngestError, Result};
pub use models::*;
