//! NumPy `.npy` v1.0 编码

use crate::extractor::PixelArtifact;
use std::io::{self, Write};

const MAGIC: &[u8] = b"\x93NUMPY";
const VERSION: [u8; 2] = [1, 0];
/// 魔数+版本+头长度字段
const PREAMBLE_LEN: usize = MAGIC.len() + VERSION.len() + 2;
const ALIGNMENT: usize = 64;

/// 生成头部字典（含空格填充和换行）
fn header(artifact: &PixelArtifact) -> String {
    let [rows, columns, samples] = artifact.shape();
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, {}, {}), }}",
        artifact.descr(),
        rows,
        columns,
        samples
    );

    let unpadded = PREAMBLE_LEN + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    header
}

/// 把像素数组写入任意输出
pub fn write_npy<W: Write>(artifact: &PixelArtifact, mut writer: W) -> io::Result<()> {
    let header = header(artifact);
    let header_len = u16::try_from(header.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "npy header too long"))?;

    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION)?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    writer.write_all(&artifact.samples.to_le_bytes())?;
    writer.flush()
}

/// 编码为内存中的字节
pub fn encode(artifact: &PixelArtifact) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_npy(artifact, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PixelSamples;

    fn artifact(samples: PixelSamples) -> PixelArtifact {
        PixelArtifact {
            rows: 2,
            columns: 3,
            samples_per_pixel: 1,
            samples,
        }
    }

    fn header_text(bytes: &[u8]) -> String {
        let len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        String::from_utf8(bytes[10..10 + len].to_vec()).unwrap()
    }

    #[test]
    fn test_preamble_and_alignment() {
        let bytes = encode(&artifact(PixelSamples::U16(vec![1, 2, 3, 4, 5, 6]))).unwrap();

        assert_eq!(&bytes[..6], MAGIC);
        assert_eq!(&bytes[6..8], &[1, 0]);

        let header = header_text(&bytes);
        assert_eq!((PREAMBLE_LEN + header.len()) % 64, 0);
        assert!(header.ends_with('\n'));
        assert!(header.starts_with(
            "{'descr': '<u2', 'fortran_order': False, 'shape': (2, 3, 1), }"
        ));
    }

    #[test]
    fn test_data_is_little_endian() {
        let bytes = encode(&artifact(PixelSamples::U16(vec![0x0102, 0, 0, 0, 0, 0x0a0b]))).unwrap();
        let data = &bytes[bytes.len() - 12..];
        assert_eq!(&data[..2], &[0x02, 0x01]);
        assert_eq!(&data[10..], &[0x0b, 0x0a]);
        assert_eq!(bytes.len() % 64, 12);
    }

    #[test]
    fn test_descr_per_type() {
        let cases = [
            (PixelSamples::U8(vec![0; 6]), "|u1"),
            (PixelSamples::I8(vec![0; 6]), "|i1"),
            (PixelSamples::I16(vec![0; 6]), "<i2"),
            (PixelSamples::U32(vec![0; 6]), "<u4"),
            (PixelSamples::I32(vec![0; 6]), "<i4"),
        ];
        for (samples, descr) in cases {
            let header = header_text(&encode(&artifact(samples)).unwrap());
            assert!(header.contains(&format!("'descr': '{}'", descr)), "{header}");
        }
    }
}
