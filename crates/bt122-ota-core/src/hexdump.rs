//! Hex formatting helpers for logs and the CLI

use std::fmt::Write;

/// Parse a hex string such as `"0a1b"`, `"0a 1b"` or `"0x0A1B"` into bytes
pub fn parse_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    hex::decode(digits)
}

/// Space separated `0xAA 0xBB` rendering
pub fn format_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("0x{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Address-annotated table with `line_len` bytes per row
///
/// ```text
/// Address | 0  1  2  3
/// --------+------------
/// 00000000|de ad be ef
/// ```
pub fn format_hex(data: &[u8], line_len: usize) -> String {
    let line_len = line_len.max(1);
    let mut out = String::new();

    out.push_str("Address |");
    for i in 0..line_len {
        let _ = write!(out, "{:>2x} ", i);
    }
    out.push('\n');
    out.push_str("--------+");
    out.push_str(&"---".repeat(line_len));
    out.push('\n');

    for (row, chunk) in data.chunks(line_len).enumerate() {
        let _ = write!(out, "{:08x}|", row * line_len);
        let bytes: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        out.push_str(&bytes.join(" "));
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0a1bff").unwrap(), vec![0x0A, 0x1B, 0xFF]);
        assert_eq!(parse_hex("0x0A 1B").unwrap(), vec![0x0A, 0x1B]);
        assert_eq!(parse_hex("11 33 55 77").unwrap(), vec![0x11, 0x33, 0x55, 0x77]);
        assert_eq!(parse_hex("abc"), Err(hex::FromHexError::OddLength));
        assert!(matches!(
            parse_hex("zz"),
            Err(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 })
        ));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(&[1, 0xAB]), "0x01 0xAB");
        assert_eq!(format_bytes(&[]), "");
    }

    #[test]
    fn test_format_hex_rows() {
        let data: Vec<u8> = (0u8..20).collect();
        let dump = format_hex(&data, 16);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Address | 0  1"));
        assert!(lines[2].starts_with("00000000|00 01 02"));
        assert_eq!(lines[3], "00000010|10 11 12 13");
    }
}
