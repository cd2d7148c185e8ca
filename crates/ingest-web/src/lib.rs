//! # Web接口模块
//!
//! 通过HTTP暴露上传、列表、下载和删除接口。

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, WebServer};
