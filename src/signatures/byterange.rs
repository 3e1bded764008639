//! ByteRange reservation and filling.
//!
//! A signature layer reserves two placeholders in its signature dictionary:
//!
//! - `/ByteRange`: a fixed-width array later overwritten in place with
//!   `[0 before_sig after_sig_start after_sig_len]`, padded with spaces;
//! - `/Contents`: a hex string of zeros later overwritten with the
//!   DER-encoded CMS, padded with zeros.
//!
//! Neither write changes the file length, so every offset computed while
//! preparing the revision stays valid.

use crate::error::{Error, Result};

/// Width of the `/ByteRange` placeholder, brackets included.
///
/// Room for three ten-digit integers after the leading zero.
pub const BYTE_RANGE_PLACEHOLDER_WIDTH: usize = 2 + 1 + 3 * 11;

/// Calculator for PDF signature byte ranges.
#[derive(Debug, Clone, Copy)]
pub struct ByteRangeCalculator {
    /// Size of the `/Contents` placeholder (hex digits + 2 for angle brackets)
    placeholder_size: usize,
}

impl ByteRangeCalculator {
    /// Create a calculator reserving room for a DER blob of
    /// `estimated_signature_size` bytes.
    pub fn new(estimated_signature_size: usize) -> Self {
        Self {
            placeholder_size: estimated_signature_size * 2 + 2,
        }
    }

    /// Get the placeholder size (for the /Contents value).
    pub fn placeholder_size(&self) -> usize {
        self.placeholder_size
    }

    /// `<000...0>` of exactly [`Self::placeholder_size`] bytes.
    pub fn generate_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.placeholder_size - 2))
    }

    /// Blank `/ByteRange` value of [`BYTE_RANGE_PLACEHOLDER_WIDTH`] bytes.
    pub fn generate_byte_range_placeholder() -> String {
        let mut placeholder = String::from("[0");
        placeholder.push_str(&" ".repeat(BYTE_RANGE_PLACEHOLDER_WIDTH - 3));
        placeholder.push(']');
        placeholder
    }

    /// `[0, before_sig, after_sig_start, after_sig_len]` for a placeholder
    /// starting at `contents_offset` (the `<`).
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> [i64; 4] {
        let before_sig = contents_offset as i64;
        let after_sig_start = (contents_offset + self.placeholder_size) as i64;
        let after_sig_len = file_size as i64 - after_sig_start;

        [0, before_sig, after_sig_start, after_sig_len]
    }

    /// Format a ByteRange array padded with spaces to the placeholder width.
    pub fn format_byte_range(byte_range: &[i64; 4]) -> Result<String> {
        let mut formatted =
            format!("[{} {} {} {}", byte_range[0], byte_range[1], byte_range[2], byte_range[3]);
        if formatted.len() + 1 > BYTE_RANGE_PLACEHOLDER_WIDTH {
            return Err(Error::InvalidPdf(format!(
                "ByteRange {:?} does not fit its placeholder",
                byte_range
            )));
        }
        formatted.push_str(&" ".repeat(BYTE_RANGE_PLACEHOLDER_WIDTH - 1 - formatted.len()));
        formatted.push(']');
        Ok(formatted)
    }

    /// Overwrite the `/ByteRange` placeholder at `offset`.
    pub fn fill_byte_range(pdf_data: &mut [u8], offset: usize, byte_range: &[i64; 4]) -> Result<()> {
        let formatted = Self::format_byte_range(byte_range)?;
        let end = offset + BYTE_RANGE_PLACEHOLDER_WIDTH;
        if end > pdf_data.len() || pdf_data[offset] != b'[' {
            return Err(Error::InvalidPdf("ByteRange placeholder not found".to_string()));
        }
        pdf_data[offset..end].copy_from_slice(formatted.as_bytes());
        Ok(())
    }

    /// Concatenation of the two ranges named by `byte_range`.
    pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
        if byte_range.iter().any(|&v| v < 0) {
            return Err(Error::InvalidPdf(format!("Negative ByteRange entry: {:?}", byte_range)));
        }
        let offset1 = byte_range[0] as usize;
        let length1 = byte_range[1] as usize;
        let offset2 = byte_range[2] as usize;
        let length2 = byte_range[3] as usize;

        let end1 = offset1.checked_add(length1);
        let end2 = offset2.checked_add(length2);
        let (end1, end2) = match (end1, end2) {
            (Some(end1), Some(end2)) if end1 <= pdf_data.len() && end2 <= pdf_data.len() => (end1, end2),
            _ => {
                return Err(Error::InvalidPdf(format!(
                    "ByteRange {:?} exceeds file size {}",
                    byte_range,
                    pdf_data.len()
                )))
            },
        };

        let mut signed_bytes = Vec::with_capacity(length1 + length2);
        signed_bytes.extend_from_slice(&pdf_data[offset1..end1]);
        signed_bytes.extend_from_slice(&pdf_data[offset2..end2]);
        Ok(signed_bytes)
    }

    /// Check that a ByteRange covers `file_size` bytes except one gap.
    pub fn validate_byte_range(byte_range: &[i64; 4], file_size: usize) -> Result<()> {
        let [offset1, length1, offset2, length2] = *byte_range;

        if offset1 != 0 {
            return Err(Error::InvalidPdf(format!("ByteRange must start at 0, got {}", offset1)));
        }
        let end = offset2
            .checked_add(length2)
            .ok_or_else(|| Error::InvalidPdf(format!("ByteRange {:?} overflows", byte_range)))?;
        if end != file_size as i64 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange must end at file size {}, got {}",
                file_size, end
            )));
        }
        if length1 > offset2 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                length1, offset2
            )));
        }
        Ok(())
    }

    /// Replace the `/Contents` placeholder with `signature`, zero padded.
    pub fn insert_signature(
        &self,
        pdf_data: &mut [u8],
        contents_offset: usize,
        signature: &[u8],
    ) -> Result<()> {
        let needed = signature.len() * 2 + 2;
        if needed > self.placeholder_size {
            return Err(Error::PlaceholderTooSmall {
                needed,
                available: self.placeholder_size,
            });
        }
        let end = contents_offset + self.placeholder_size;
        if end > pdf_data.len() || pdf_data[contents_offset] != b'<' || pdf_data[end - 1] != b'>' {
            return Err(Error::InvalidPdf("Contents placeholder not found".to_string()));
        }

        let hex = crate::writer::bytes_to_hex(signature);
        pdf_data[contents_offset + 1..contents_offset + 1 + hex.len()]
            .copy_from_slice(hex.as_bytes());
        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SIGNATURE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_size() {
        let calc = ByteRangeCalculator::new(1024);
        assert_eq!(calc.placeholder_size(), 2050);
        assert_eq!(calc.generate_placeholder().len(), 2050);
    }

    #[test]
    fn test_calculate_byte_range() {
        let calc = ByteRangeCalculator::new(49);
        let byte_range = calc.calculate_byte_range(1000, 400);
        assert_eq!(byte_range, [0, 400, 500, 500]);
    }

    #[test]
    fn test_byte_range_fill_keeps_width() {
        let placeholder = ByteRangeCalculator::generate_byte_range_placeholder();
        assert_eq!(placeholder.len(), BYTE_RANGE_PLACEHOLDER_WIDTH);

        let mut data = format!("/ByteRange {} /X", placeholder).into_bytes();
        let before = data.len();
        ByteRangeCalculator::fill_byte_range(&mut data, 11, &[0, 1234, 5678, 9999999999]).unwrap();
        assert_eq!(data.len(), before);
        let text = String::from_utf8(data).unwrap();
        assert!(text.starts_with("/ByteRange [0 1234 5678 9999999999"));
        assert!(text.ends_with("] /X"));
    }

    #[test]
    fn test_extract_signed_bytes() {
        let signed = ByteRangeCalculator::extract_signed_bytes(b"AAABBBCCC", &[0, 3, 6, 3]).unwrap();
        assert_eq!(signed, b"AAACCC");
        assert!(ByteRangeCalculator::extract_signed_bytes(b"AAA", &[0, 3, 6, 3]).is_err());
    }

    #[test]
    fn test_huge_byte_range_is_rejected() {
        let huge = [i64::MAX, i64::MAX, 0, 3];
        assert!(matches!(
            ByteRangeCalculator::extract_signed_bytes(b"AAABBBCCC", &huge),
            Err(Error::InvalidPdf(_))
        ));
        assert!(matches!(
            ByteRangeCalculator::validate_byte_range(&[0, 3, i64::MAX, 1], 9),
            Err(Error::InvalidPdf(_))
        ));
    }

    #[test]
    fn test_validate_byte_range() {
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 50], 200).is_ok());
        assert!(ByteRangeCalculator::validate_byte_range(&[10, 100, 150, 50], 200).is_err());
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 100], 200).is_err());
    }

    #[test]
    fn test_insert_signature_pads_with_zeros() {
        let calc = ByteRangeCalculator::new(4);
        let mut pdf_data = b"XX<00000000>YY".to_vec();
        calc.insert_signature(&mut pdf_data, 2, &[0xAB, 0xCD]).unwrap();
        assert_eq!(&pdf_data, b"XX<ABCD0000>YY");
    }

    #[test]
    fn test_insert_signature_too_large() {
        let calc = ByteRangeCalculator::new(4);
        let mut pdf_data = b"XX<00000000>YY".to_vec();
        let result = calc.insert_signature(&mut pdf_data, 2, &[1, 2, 3, 4, 5]);
        assert!(matches!(
            result,
            Err(Error::PlaceholderTooSmall {
                needed: 12,
                available: 10
            })
        ));
    }
}
