//! 通用工具函数

/// 验证DICOM UID格式
pub fn is_valid_dicom_uid(uid: &str) -> bool {
    if uid.is_empty() || uid.len() > 64 {
        return false;
    }

    if !uid.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return false;
    }

    // 不能以点开头或结尾，也不能有连续的点
    !(uid.starts_with('.') || uid.ends_with('.') || uid.contains(".."))
}

/// 标识符能否安全地用作文件名前缀
pub fn is_safe_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier != "."
        && identifier != ".."
        && !identifier
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
}

/// 去掉DICOM值两端的空格和NUL填充
pub fn trim_dicom_value(value: &str) -> &str {
    value.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}
