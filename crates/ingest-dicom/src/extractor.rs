//! 像素数据提取
//!
//! 把PixelData元素转换成带形状和元素类型的数值数组。

use crate::reader::ParsedDicomObject;
use crate::transfer_syntax::TransferSyntaxManager;
use dicom::core::PrimitiveValue;
use dicom::dictionary_std::tags;
use ingest_core::{IngestError, Result};
use std::borrow::Cow;
use tracing::{debug, error};

/// 像素数组的元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelSamples {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
}

impl PixelSamples {
    pub fn len(&self) -> usize {
        match self {
            PixelSamples::U8(v) => v.len(),
            PixelSamples::I8(v) => v.len(),
            PixelSamples::U16(v) => v.len(),
            PixelSamples::I16(v) => v.len(),
            PixelSamples::U32(v) => v.len(),
            PixelSamples::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// NumPy的类型描述符（小端）
    pub fn descr(&self) -> &'static str {
        match self {
            PixelSamples::U8(_) => "|u1",
            PixelSamples::I8(_) => "|i1",
            PixelSamples::U16(_) => "<u2",
            PixelSamples::I16(_) => "<i2",
            PixelSamples::U32(_) => "<u4",
            PixelSamples::I32(_) => "<i4",
        }
    }

    /// 按小端序输出元素字节
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            PixelSamples::U8(v) => v.clone(),
            PixelSamples::I8(v) => v.iter().map(|x| *x as u8).collect(),
            PixelSamples::U16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            PixelSamples::I16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            PixelSamples::U32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            PixelSamples::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }
}

/// 提取结果：rows × columns × samples_per_pixel 的数组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelArtifact {
    pub rows: u32,
    pub columns: u32,
    pub samples_per_pixel: u32,
    pub samples: PixelSamples,
}

impl PixelArtifact {
    pub fn shape(&self) -> [usize; 3] {
        [
            self.rows as usize,
            self.columns as usize,
            self.samples_per_pixel as usize,
        ]
    }

    pub fn descr(&self) -> &'static str {
        self.samples.descr()
    }
}

/// 解码所需的图像几何和编码信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub rows: u32,
    pub columns: u32,
    pub samples_per_pixel: u32,
    pub bits_allocated: u32,
    pub signed: bool,
    pub big_endian: bool,
}

impl PixelLayout {
    fn sample_count(&self) -> Result<usize> {
        (self.rows as usize)
            .checked_mul(self.columns as usize)
            .and_then(|n| n.checked_mul(self.samples_per_pixel as usize))
            .ok_or_else(|| IngestError::ExtractionFailure("图像尺寸溢出".to_string()))
    }
}

/// 像素数据提取器
#[derive(Debug, Clone, Default)]
pub struct PixelExtractor {
    transfer_syntax_manager: TransferSyntaxManager,
}

impl PixelExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从解析后的对象中提取像素数组
    pub fn extract(&self, parsed: &ParsedDicomObject) -> Result<PixelArtifact> {
        let layout = self.layout(parsed)?;

        if let Some(uid) = parsed.transfer_syntax_uid() {
            if self.transfer_syntax_manager.is_compressed(&uid) {
                error!("不支持压缩像素数据: {}", self.transfer_syntax_manager.name(&uid));
                return Err(IngestError::ExtractionFailure(format!(
                    "压缩传输语法的像素数据无法解码: {}",
                    self.transfer_syntax_manager.name(&uid)
                )));
            }
        }

        if !parsed.has_element(tags::PIXEL_DATA) {
            return Err(IngestError::MissingPixelPayload);
        }
        let payload = parsed.pixel_value().ok_or_else(|| {
            IngestError::ExtractionFailure("像素数据为封装格式，无法直接解码".to_string())
        })?;

        let samples = decode(&layout, payload)?;
        debug!(
            "像素数据提取完成: {}x{}x{}, 类型 {}",
            layout.rows,
            layout.columns,
            layout.samples_per_pixel,
            samples.descr()
        );

        Ok(PixelArtifact {
            rows: layout.rows,
            columns: layout.columns,
            samples_per_pixel: layout.samples_per_pixel,
            samples,
        })
    }

    fn layout(&self, parsed: &ParsedDicomObject) -> Result<PixelLayout> {
        let rows = parsed.integer(tags::ROWS).unwrap_or(0);
        let columns = parsed.integer(tags::COLUMNS).unwrap_or(0);
        if rows == 0 || columns == 0 {
            return Err(IngestError::ExtractionFailure(format!(
                "图像尺寸无效: Rows={}, Columns={}",
                rows, columns
            )));
        }

        let samples_per_pixel = parsed.integer(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
        if samples_per_pixel == 0 {
            return Err(IngestError::ExtractionFailure(
                "SamplesPerPixel 不能为0".to_string(),
            ));
        }

        let bits_allocated = parsed.integer(tags::BITS_ALLOCATED).unwrap_or(16);
        if !matches!(bits_allocated, 8 | 16 | 32) {
            return Err(IngestError::ExtractionFailure(format!(
                "不支持的 BitsAllocated: {}",
                bits_allocated
            )));
        }

        let signed = parsed.integer(tags::PIXEL_REPRESENTATION).unwrap_or(0) == 1;
        let big_endian = parsed
            .transfer_syntax_uid()
            .map(|uid| self.transfer_syntax_manager.is_big_endian(&uid))
            .unwrap_or(false);

        Ok(PixelLayout {
            rows,
            columns,
            samples_per_pixel,
            bits_allocated,
            signed,
            big_endian,
        })
    }
}

/// 按字解码的值还原为小端字节流
fn le_stream<T, F, const N: usize>(values: &[T], to_bytes: F) -> Cow<'static, [u8]>
where
    T: Copy,
    F: Fn(T) -> [u8; N],
{
    Cow::Owned(values.iter().flat_map(|v| to_bytes(*v)).collect())
}

/// 按布局解码像素值
///
/// 字节流（OB）按传输语法的字节序解释；已按字解码的值（OW等）先还原为小端字节流。
/// 长度必须与几何信息一致，仅在期望长度为奇数时允许一个尾随填充字节。
pub fn decode(layout: &PixelLayout, payload: &PrimitiveValue) -> Result<PixelSamples> {
    let (bytes, big_endian): (Cow<'_, [u8]>, bool) = match payload {
        PrimitiveValue::U8(v) => (Cow::Borrowed(&v[..]), layout.big_endian),
        PrimitiveValue::U16(v) => (le_stream(v, u16::to_le_bytes), false),
        PrimitiveValue::I16(v) => (le_stream(v, i16::to_le_bytes), false),
        PrimitiveValue::U32(v) => (le_stream(v, u32::to_le_bytes), false),
        PrimitiveValue::I32(v) => (le_stream(v, i32::to_le_bytes), false),
        _ => {
            return Err(IngestError::ExtractionFailure(
                "PixelData 的值类型不受支持".to_string(),
            ))
        }
    };

    let width = (layout.bits_allocated / 8) as usize;
    let expected = layout
        .sample_count()?
        .checked_mul(width)
        .ok_or_else(|| IngestError::ExtractionFailure("图像尺寸溢出".to_string()))?;

    let padded = expected % 2 == 1 && bytes.len() == expected + 1;
    if bytes.len() != expected && !padded {
        return Err(IngestError::ExtractionFailure(format!(
            "像素数据长度不匹配: 期望 {} 字节, 实际 {} 字节",
            expected,
            bytes.len()
        )));
    }
    let data = &bytes[..expected];

    let samples = match (layout.bits_allocated, layout.signed) {
        (8, false) => PixelSamples::U8(data.to_vec()),
        (8, true) => PixelSamples::I8(data.iter().map(|b| *b as i8).collect()),
        (16, false) => PixelSamples::U16(
            data.chunks_exact(2)
                .map(|c| {
                    let c = [c[0], c[1]];
                    if big_endian {
                        u16::from_be_bytes(c)
                    } else {
                        u16::from_le_bytes(c)
                    }
                })
                .collect(),
        ),
        (16, true) => PixelSamples::I16(
            data.chunks_exact(2)
                .map(|c| {
                    let c = [c[0], c[1]];
                    if big_endian {
                        i16::from_be_bytes(c)
                    } else {
                        i16::from_le_bytes(c)
                    }
                })
                .collect(),
        ),
        (32, false) => PixelSamples::U32(
            data.chunks_exact(4)
                .map(|c| {
                    let c = [c[0], c[1], c[2], c[3]];
                    if big_endian {
                        u32::from_be_bytes(c)
                    } else {
                        u32::from_le_bytes(c)
                    }
                })
                .collect(),
        ),
        (32, true) => PixelSamples::I32(
            data.chunks_exact(4)
                .map(|c| {
                    let c = [c[0], c[1], c[2], c[3]];
                    if big_endian {
                        i32::from_be_bytes(c)
                    } else {
                        i32::from_le_bytes(c)
                    }
                })
                .collect(),
        ),
        (bits, _) => {
            return Err(IngestError::ExtractionFailure(format!(
                "不支持的 BitsAllocated: {}",
                bits
            )))
        }
    };

    Ok(samples)
}
