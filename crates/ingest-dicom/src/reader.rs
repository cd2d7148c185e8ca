//! DICOM文件读取器
//!
//! 把暂存的上传文件解析成内存中的DICOM对象

use dicom::core::{PrimitiveValue, Tag};
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject, InMemDicomObject};
use ingest_core::utils::trim_dicom_value;
use ingest_core::{DicomMetadataRecord, IngestError, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// DICOM文件读取器
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomReader;

impl DicomReader {
    /// 创建新的读取器
    pub fn new() -> Self {
        Self
    }

    /// 解析DICOM文件
    ///
    /// 读取失败（文件不存在、权限不足）返回 `UnexpectedIo`，
    /// 内容不是合法的DICOM文件返回 `InvalidFormat`。
    pub fn parse<P: AsRef<Path>>(&self, path: P) -> Result<ParsedDicomObject> {
        let path = path.as_ref();
        info!("开始解析DICOM文件: {:?}", path);

        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(IngestError::UnexpectedIo(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }
        // 先单独打开一次，把权限类错误和格式错误区分开
        drop(std::fs::File::open(path)?);

        let object = open_file(path).map_err(|e| {
            error!("DICOM文件解析失败: {:?}, 错误: {}", path, e);
            IngestError::InvalidFormat(format!("{}: {}", display_name(path), e))
        })?;

        let parsed = ParsedDicomObject::new(object, path);
        debug!("成功解析DICOM文件: {}", parsed.summary());
        Ok(parsed)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// 解析后的DICOM对象：标签→值映射加上像素数据
#[derive(Debug, Clone)]
pub struct ParsedDicomObject {
    object: DefaultDicomObject,
    source: PathBuf,
}

impl ParsedDicomObject {
    pub fn new(object: DefaultDicomObject, source: impl Into<PathBuf>) -> Self {
        Self {
            object,
            source: source.into(),
        }
    }

    /// 来源文件路径
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn object(&self) -> &DefaultDicomObject {
        &self.object
    }

    pub(crate) fn object_mut(&mut self) -> &mut DefaultDicomObject {
        &mut self.object
    }

    /// 数据集中是否存在该标签
    pub fn has_element(&self, tag: Tag) -> bool {
        self.object.element(tag).is_ok()
    }

    /// 获取字符串类型元素的值，空值视为不存在
    pub fn string(&self, tag: Tag) -> Option<String> {
        let element = self.object.element(tag).ok()?;
        let value = element.to_str().ok()?;
        let value = trim_dicom_value(&value);
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    /// 获取整数类型元素的值
    pub fn integer(&self, tag: Tag) -> Option<u32> {
        self.object.element(tag).ok()?.to_int::<u32>().ok()
    }

    /// 像素数据的原始值；封装（压缩）格式返回 `None`
    pub fn pixel_value(&self) -> Option<&PrimitiveValue> {
        self.object
            .element(tags::PIXEL_DATA)
            .ok()
            .and_then(|element| element.value().primitive())
    }

    /// 数据集中的私有标签（奇数组号）
    pub fn private_tags(&self) -> Vec<Tag> {
        let dataset: &InMemDicomObject = &self.object;
        dataset
            .into_iter()
            .map(|element| element.header().tag)
            .filter(|tag| tag.group() % 2 == 1)
            .collect()
    }

    /// SOP实例UID，即存储标识符
    pub fn sop_instance_uid(&self) -> Option<String> {
        self.string(tags::SOP_INSTANCE_UID)
    }

    pub fn sop_class_uid(&self) -> Option<String> {
        self.string(tags::SOP_CLASS_UID)
    }

    pub fn modality(&self) -> Option<String> {
        self.string(tags::MODALITY)
    }

    /// 文件元信息中的传输语法UID
    pub fn transfer_syntax_uid(&self) -> Option<String> {
        let uid = trim_dicom_value(self.object.meta().transfer_syntax());
        if uid.is_empty() {
            None
        } else {
            Some(uid.to_string())
        }
    }

    /// 生成交给持久化组件的精简元数据
    pub fn metadata_record(&self, file_path: impl Into<PathBuf>) -> DicomMetadataRecord {
        DicomMetadataRecord {
            modality: self.modality(),
            sop_class_uid: self.sop_class_uid(),
            manufacturer: self.string(tags::MANUFACTURER),
            rows: self.integer(tags::ROWS),
            columns: self.integer(tags::COLUMNS),
            bits_allocated: self.integer(tags::BITS_ALLOCATED),
            photometric_interpretation: self.string(tags::PHOTOMETRIC_INTERPRETATION),
            transfer_syntax_uid: self.transfer_syntax_uid(),
            file_path: file_path.into(),
        }
    }

    /// 获取DICOM对象的摘要信息（不含患者信息）
    pub fn summary(&self) -> String {
        format!(
            "DICOM对象: SOP实例UID={}, 模态={}, 传输语法={}",
            self.sop_instance_uid().as_deref().unwrap_or("未知"),
            self.modality().as_deref().unwrap_or("未知"),
            self.transfer_syntax_uid().as_deref().unwrap_or("未知")
        )
    }
}
