//! 测试用DICOM对象构造工具

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::{DefaultDicomObject, FileMetaTableBuilder, InMemDicomObject};
use std::collections::BTreeMap;
use std::path::Path;

/// 可定制的最小CT实例（2x3，16位单通道）
#[derive(Debug, Clone)]
pub struct DicomFixture {
    elements: BTreeMap<Tag, InMemElement>,
    transfer_syntax: String,
}

impl Default for DicomFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl DicomFixture {
    pub const DEFAULT_SOP_INSTANCE_UID: &'static str = "1.2.826.0.1.3680043.9.7382.1.1";
    pub const CT_IMAGE_STORAGE: &'static str = "1.2.840.10008.5.1.4.1.1.2";
    pub const PATIENT_NAME: &'static str = "Doe^John";
    pub const INSTITUTION_NAME: &'static str = "General Hospital";
    pub const REFERRING_PHYSICIAN_NAME: &'static str = "Smith^Anna";
    pub const PATIENT_ADDRESS: &'static str = "Main Street 1";

    pub fn new() -> Self {
        let fixture = Self {
            elements: BTreeMap::new(),
            transfer_syntax: "1.2.840.10008.1.2.1".to_string(),
        };

        fixture
            .string(tags::SOP_CLASS_UID, VR::UI, Self::CT_IMAGE_STORAGE)
            .string(tags::SOP_INSTANCE_UID, VR::UI, Self::DEFAULT_SOP_INSTANCE_UID)
            .string(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.826.0.1.3680043.9.7382.1")
            .string(tags::SERIES_INSTANCE_UID, VR::UI, "1.2.826.0.1.3680043.9.7382.1.0")
            .string(tags::MODALITY, VR::CS, "CT")
            .string(tags::MANUFACTURER, VR::LO, "ACME")
            .string(tags::PATIENT_NAME, VR::PN, Self::PATIENT_NAME)
            .string(tags::PATIENT_ID, VR::LO, "PAT001")
            .string(tags::INSTITUTION_NAME, VR::LO, Self::INSTITUTION_NAME)
            .string(
                tags::REFERRING_PHYSICIAN_NAME,
                VR::PN,
                Self::REFERRING_PHYSICIAN_NAME,
            )
            .string(tags::PATIENT_ADDRESS, VR::LO, Self::PATIENT_ADDRESS)
            .string(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2")
            .geometry(2, 3, 1, 16)
            .pixel_data((0u8..12).collect())
    }

    /// 设置任意字符串元素
    pub fn string(mut self, tag: Tag, vr: VR, value: &str) -> Self {
        self.elements
            .insert(tag, DataElement::new(tag, vr, PrimitiveValue::from(value)));
        self
    }

    pub fn sop_instance_uid(self, uid: &str) -> Self {
        self.string(tags::SOP_INSTANCE_UID, VR::UI, uid)
    }

    pub fn sop_class_uid(self, uid: &str) -> Self {
        self.string(tags::SOP_CLASS_UID, VR::UI, uid)
    }

    pub fn modality(self, modality: &str) -> Self {
        self.string(tags::MODALITY, VR::CS, modality)
    }

    pub fn study_date(self, date: &str) -> Self {
        self.string(tags::STUDY_DATE, VR::DA, date)
    }

    /// 设置行、列、每像素样本数和分配位数
    pub fn geometry(mut self, rows: u16, columns: u16, samples: u16, bits_allocated: u16) -> Self {
        for (tag, value) in [
            (tags::ROWS, rows),
            (tags::COLUMNS, columns),
            (tags::SAMPLES_PER_PIXEL, samples),
            (tags::BITS_ALLOCATED, bits_allocated),
            (tags::BITS_STORED, bits_allocated),
            (tags::HIGH_BIT, bits_allocated.saturating_sub(1)),
            (tags::PIXEL_REPRESENTATION, 0),
        ] {
            self.elements
                .insert(tag, DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
        }
        self
    }

    pub fn pixel_representation(mut self, value: u16) -> Self {
        self.elements.insert(
            tags::PIXEL_REPRESENTATION,
            DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(value)),
        );
        self
    }

    pub fn pixel_data(mut self, bytes: Vec<u8>) -> Self {
        self.elements.insert(
            tags::PIXEL_DATA,
            DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::from(bytes)),
        );
        self
    }

    pub fn transfer_syntax(mut self, uid: &str) -> Self {
        self.transfer_syntax = uid.to_string();
        self
    }

    /// 移除某个元素
    pub fn without(mut self, tag: Tag) -> Self {
        self.elements.remove(&tag);
        self
    }

    /// 构造带文件元信息的DICOM对象
    pub fn build(&self) -> DefaultDicomObject {
        let sop_class_uid = self.text(tags::SOP_CLASS_UID, Self::CT_IMAGE_STORAGE);
        let sop_instance_uid = self.text(tags::SOP_INSTANCE_UID, "1.2.3.999");

        InMemDicomObject::from_element_iter(self.elements.values().cloned())
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(self.transfer_syntax.as_str())
                    .media_storage_sop_class_uid(sop_class_uid)
                    .media_storage_sop_instance_uid(sop_instance_uid),
            )
            .expect("fixture meta table should be complete")
    }

    /// 写成DICOM Part 10文件
    pub fn write_to(&self, path: impl AsRef<Path>) {
        self.build()
            .write_to_file(path.as_ref())
            .expect("fixture should be writable");
    }

    /// DICOM Part 10文件的字节内容
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.build()
            .write_all(&mut bytes)
            .expect("fixture should serialize");
        bytes
    }

    fn text(&self, tag: Tag, fallback: &str) -> String {
        self.elements
            .get(&tag)
            .and_then(|element| element.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}
