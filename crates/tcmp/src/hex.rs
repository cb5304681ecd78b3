use std::fmt::Write;

/// Parse a hex byte string. Whitespace, `:` and `-` separators and a
/// leading `0x` are ignored.
pub fn parse(input: &str) -> Result<Vec<u8>, String> {
    let input = input.trim();
    let input = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);

    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':' && *b != b'-')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!(
            "odd number of hex digits ({}); bytes need two digits each",
            digits.len()
        ));
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            let high = nibble(pair[0])?;
            let low = nibble(pair[1])?;
            Ok((high << 4) | low)
        })
        .collect()
}

fn nibble(digit: u8) -> Result<u8, String> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(format!("invalid hex digit {:?}", char::from(other))),
    }
}

/// Lowercase hex with no separators.
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Uppercase hex, one space between bytes.
pub fn spaced(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Parse a decimal or `0x`-prefixed integer.
pub fn parse_number(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid number: {input}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_separators_and_prefix() {
        assert_eq!(parse("7E 00 05").unwrap(), vec![0x7E, 0x00, 0x05]);
        assert_eq!(parse("0x7e:00-05").unwrap(), vec![0x7E, 0x00, 0x05]);
        assert_eq!(parse("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse("7").is_err());
        assert!(parse("zz").is_err());
    }

    #[test]
    fn encode_and_spaced() {
        assert_eq!(encode(&[0x00, 0xAB, 0x7E]), "00ab7e");
        assert_eq!(spaced(&[0x00, 0xAB, 0x7E]), "00 AB 7E");
        assert_eq!(spaced(&[]), "");
    }

    #[test]
    fn parse_number_decimal_and_hex() {
        assert_eq!(parse_number("17").unwrap(), 17);
        assert_eq!(parse_number("0x11").unwrap(), 17);
        assert!(parse_number("0xg").is_err());
    }
}
