//! DICOM数据验证模块
//!
//! 结构性检查遇到第一个违规即失败；其余检查只产生警告

use crate::reader::ParsedDicomObject;
use crate::transfer_syntax::TransferSyntaxManager;
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use ingest_core::config::ValidationConfig;
use ingest_core::utils::is_valid_dicom_uid;
use ingest_core::{IngestError, Result};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// 寻址和路由一个对象所需的最少字段
const REQUIRED_TAGS: [(Tag, &str); 3] = [
    (tags::SOP_INSTANCE_UID, "SOPInstanceUID"),
    (tags::SOP_CLASS_UID, "SOPClassUID"),
    (tags::MODALITY, "Modality"),
];

/// DICOM数据验证器
#[derive(Debug, Clone)]
pub struct DicomValidator {
    transfer_syntax_manager: TransferSyntaxManager,
    strict_modality: bool,
    allowed_modalities: HashSet<String>,
}

impl Default for DicomValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DicomValidator {
    /// 创建使用默认模态词表、非严格模式的验证器
    pub fn new() -> Self {
        Self::from_config(&ValidationConfig::default())
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self {
            transfer_syntax_manager: TransferSyntaxManager::new(),
            strict_modality: config.strict_modality,
            allowed_modalities: config
                .allowed_modalities
                .iter()
                .map(|m| m.trim().to_uppercase())
                .collect(),
        }
    }

    /// 验证DICOM对象
    pub fn validate(&self, obj: &ParsedDicomObject) -> Result<ValidationReport> {
        let filename = obj.source().display().to_string();
        info!("开始验证DICOM对象: {}", filename);

        self.check_required_tags(obj)?;
        let mut report = ValidationReport::new();
        self.check_modality(obj, &mut report)?;
        self.check_pixel_data_presence(obj)?;

        self.check_uid_format(obj, &mut report);
        self.check_transfer_syntax(obj, &mut report);
        self.check_datetime_format(obj, &mut report);
        self.check_private_tags(obj, &mut report);

        info!(
            "DICOM对象验证完成: {}, {} 个警告",
            filename,
            report.warning_count()
        );
        Ok(report)
    }

    /// 检查必需标签是否存在且非空
    fn check_required_tags(&self, obj: &ParsedDicomObject) -> Result<()> {
        let missing: Vec<String> = REQUIRED_TAGS
            .iter()
            .filter(|(tag, _)| obj.string(*tag).is_none())
            .map(|(_, name)| name.to_string())
            .collect();

        if !missing.is_empty() {
            error!("缺少必需标签: {:?}", missing);
            return Err(IngestError::MissingRequiredTag(missing));
        }
        Ok(())
    }

    /// 检查模态是否在词表中
    fn check_modality(&self, obj: &ParsedDicomObject, report: &mut ValidationReport) -> Result<()> {
        let Some(modality) = obj.modality() else {
            return Ok(());
        };

        if self.allowed_modalities.contains(&modality.to_uppercase()) {
            debug!("模态验证通过: {}", modality);
            return Ok(());
        }

        if self.strict_modality {
            error!("未知或无效的模态: {}", modality);
            return Err(IngestError::UnknownModality(modality));
        }
        report.add_warning(format!("模态代码不在词表中: {}", modality));
        Ok(())
    }

    /// 检查像素数据 (7FE0,0010) 是否存在
    fn check_pixel_data_presence(&self, obj: &ParsedDicomObject) -> Result<()> {
        if !obj.has_element(tags::PIXEL_DATA) {
            error!("缺少PixelData: {:?}", obj.source());
            return Err(IngestError::MissingPixelPayload);
        }
        Ok(())
    }

    /// 验证UID格式
    fn check_uid_format(&self, obj: &ParsedDicomObject, report: &mut ValidationReport) {
        let uid_fields = [
            ("SOPInstanceUID", tags::SOP_INSTANCE_UID),
            ("SOPClassUID", tags::SOP_CLASS_UID),
            ("StudyInstanceUID", tags::STUDY_INSTANCE_UID),
            ("SeriesInstanceUID", tags::SERIES_INSTANCE_UID),
        ];

        for (name, tag) in uid_fields {
            if let Some(uid) = obj.string(tag) {
                if !is_valid_dicom_uid(&uid) {
                    report.add_warning(format!("{} 格式无效: {}", name, uid));
                }
            }
        }
    }

    /// 验证传输语法
    fn check_transfer_syntax(&self, obj: &ParsedDicomObject, report: &mut ValidationReport) {
        match obj.transfer_syntax_uid() {
            Some(uid) if self.transfer_syntax_manager.is_known(&uid) => {
                debug!("传输语法: {}", self.transfer_syntax_manager.name(&uid));
            }
            Some(uid) => report.add_warning(format!("未知的传输语法: {}", uid)),
            None => report.add_warning("传输语法信息缺失".to_string()),
        }
    }

    /// 验证日期时间格式
    fn check_datetime_format(&self, obj: &ParsedDicomObject, report: &mut ValidationReport) {
        let date_fields = [
            ("PatientBirthDate", tags::PATIENT_BIRTH_DATE),
            ("StudyDate", tags::STUDY_DATE),
        ];

        for (name, tag) in date_fields {
            if let Some(date) = obj.string(tag) {
                if !is_valid_dicom_date(&date) {
                    report.add_warning(format!("{} 格式无效: {}", name, date));
                }
            }
        }

        if let Some(time) = obj.string(tags::STUDY_TIME) {
            if !is_valid_dicom_time(&time) {
                report.add_warning(format!("StudyTime 格式无效: {}", time));
            }
        }
    }

    fn check_private_tags(&self, obj: &ParsedDicomObject, report: &mut ValidationReport) {
        for tag in obj.private_tags() {
            report.add_warning(format!("私有标签: {}", tag));
        }
    }
}

/// 检查是否为有效的DICOM日期 (YYYYMMDD)
fn is_valid_dicom_date(date: &str) -> bool {
    if date.len() != 8 || !date.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    // 解析年月日
    if let (Ok(year), Ok(month), Ok(day)) = (
        date[0..4].parse::<u32>(),
        date[4..6].parse::<u32>(),
        date[6..8].parse::<u32>(),
    ) {
        let max_day = match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if (year % 400 == 0) || (year % 100 != 0 && year % 4 == 0) => 29,
            2 => 28,
            _ => return false,
        };
        day >= 1 && day <= max_day
    } else {
        false
    }
}

/// 检查是否为有效的DICOM时间 (HHMMSS.FFFFFF)
fn is_valid_dicom_time(time: &str) -> bool {
    let (clock, fraction) = match time.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (time, None),
    };

    if clock.len() < 2 || clock.len() > 6 || clock.len() % 2 != 0 {
        return false;
    }
    if !clock.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if let Some(fraction) = fraction {
        if clock.len() != 6 || fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return false;
        }
    }

    // 允许60秒（闰秒）
    let limits = [23, 59, 60];
    clock
        .as_bytes()
        .chunks(2)
        .zip(limits)
        .all(|(pair, limit)| {
            let value = u32::from(pair[0] - b'0') * 10 + u32::from(pair[1] - b'0');
            value <= limit
        })
}

/// 验证报告：结构检查通过后的非致命问题
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// 验证警告列表
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// 创建新的验证结果
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: String) {
        warn!("[Validation] {}", warning);
        self.warnings.push(warning);
    }

    /// 检查是否有警告
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// 获取警告数量
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}
