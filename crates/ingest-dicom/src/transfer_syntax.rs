//! DICOM传输语法支持模块
//!
//! 判断传输语法是否已知、是否为压缩（封装）格式以及字节序

/// 常用的传输语法UID常量
pub mod transfer_syntax_uids {
    /// 隐式VR Little Endian (默认传输语法)
    pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

    /// 显式VR Little Endian
    pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

    /// 显式VR Big Endian
    pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";

    /// Deflated Explicit VR Little Endian
    pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";

    /// JPEG Baseline (Process 1)
    pub const JPEG_BASELINE: &str = "1.2.840.10008.1.2.4.50";

    /// JPEG Extended (Process 2 & 4)
    pub const JPEG_EXTENDED: &str = "1.2.840.10008.1.2.4.51";

    /// JPEG Lossless (Process 14)
    pub const JPEG_LOSSLESS: &str = "1.2.840.10008.1.2.4.57";

    /// JPEG Lossless, Non-Hierarchical, First-Order Prediction
    pub const JPEG_LOSSLESS_SV1: &str = "1.2.840.10008.1.2.4.70";

    /// JPEG-LS Lossless
    pub const JPEG_LS_LOSSLESS: &str = "1.2.840.10008.1.2.4.80";

    /// JPEG-LS Near Lossless
    pub const JPEG_LS_NEAR_LOSSLESS: &str = "1.2.840.10008.1.2.4.81";

    /// JPEG 2000 Image Compression (Lossless Only)
    pub const JPEG_2000_LOSSLESS: &str = "1.2.840.10008.1.2.4.90";

    /// JPEG 2000 Image Compression
    pub const JPEG_2000: &str = "1.2.840.10008.1.2.4.91";

    /// RLE Lossless
    pub const RLE_LOSSLESS: &str = "1.2.840.10008.1.2.5";
}

use transfer_syntax_uids::*;

const NATIVE_SYNTAXES: [&str; 4] = [
    IMPLICIT_VR_LITTLE_ENDIAN,
    EXPLICIT_VR_LITTLE_ENDIAN,
    EXPLICIT_VR_BIG_ENDIAN,
    DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN,
];

const COMPRESSED_SYNTAXES: [&str; 9] = [
    JPEG_BASELINE,
    JPEG_EXTENDED,
    JPEG_LOSSLESS,
    JPEG_LOSSLESS_SV1,
    JPEG_LS_LOSSLESS,
    JPEG_LS_NEAR_LOSSLESS,
    JPEG_2000_LOSSLESS,
    JPEG_2000,
    RLE_LOSSLESS,
];

/// DICOM传输语法管理器
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferSyntaxManager;

impl TransferSyntaxManager {
    /// 创建新的传输语法管理器
    pub fn new() -> Self {
        Self
    }

    /// 是否为已知的传输语法
    pub fn is_known(&self, uid: &str) -> bool {
        NATIVE_SYNTAXES.contains(&uid) || COMPRESSED_SYNTAXES.contains(&uid)
    }

    /// 像素数据是否以封装（压缩）形式存储
    pub fn is_compressed(&self, uid: &str) -> bool {
        COMPRESSED_SYNTAXES.contains(&uid)
    }

    /// 检查传输语法是否为显式VR big endian
    pub fn is_big_endian(&self, uid: &str) -> bool {
        uid == EXPLICIT_VR_BIG_ENDIAN
    }

    /// 获取传输语法的名称
    pub fn name(&self, uid: &str) -> String {
        match uid {
            IMPLICIT_VR_LITTLE_ENDIAN => "Implicit VR Little Endian".to_string(),
            EXPLICIT_VR_LITTLE_ENDIAN => "Explicit VR Little Endian".to_string(),
            EXPLICIT_VR_BIG_ENDIAN => "Explicit VR Big Endian".to_string(),
            DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN => "Deflated Explicit VR Little Endian".to_string(),
            JPEG_BASELINE => "JPEG Baseline (Process 1)".to_string(),
            JPEG_EXTENDED => "JPEG Extended (Process 2 & 4)".to_string(),
            JPEG_LOSSLESS => "JPEG Lossless (Process 14)".to_string(),
            JPEG_LOSSLESS_SV1 => {
                "JPEG Lossless, Non-Hierarchical, First-Order Prediction".to_string()
            }
            JPEG_LS_LOSSLESS => "JPEG-LS Lossless Image Compression".to_string(),
            JPEG_LS_NEAR_LOSSLESS => "JPEG-LS Near Lossless Image Compression".to_string(),
            JPEG_2000_LOSSLESS => "JPEG 2000 Image Compression (Lossless Only)".to_string(),
            JPEG_2000 => "JPEG 2000 Image Compression".to_string(),
            RLE_LOSSLESS => "RLE Lossless".to_string(),
            _ => format!("Unknown Transfer Syntax ({})", uid),
        }
    }
}
