use std::borrow::Cow;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StringParseError {
    #[error("escape at end of string")]
    EscapeAtEndOfString,
    #[error("hex escape with no valid digits")]
    HexNoDigits,
}

/// Interprets the escapes of a DTS string literal's contents (without the quotes).
///
/// Supports the C escapes `dtc` supports, including `\x` hex and `\NNN` octal escapes.
///
/// # Example
///
/// ```
/// use dt_tree::unescape;
///
/// assert_eq!(unescape(r"serial0:115200n8").unwrap(), "serial0:115200n8");
/// assert_eq!(unescape(r"tab\there\x41\101").unwrap(), "tab\there\x41A");
/// ```
pub fn unescape(s: &str) -> Result<Cow<'_, str>, StringParseError> {
    if !s.contains('\\') {
        return Ok(Cow::Borrowed(s));
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next().ok_or(StringParseError::EscapeAtEndOfString)? {
            'a' => '\x07',
            'b' => '\x08',
            'v' => '\x0b',
            'f' => '\x0c',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'x' => {
                let mut num = chars
                    .next()
                    .and_then(|c| c.to_digit(16))
                    .ok_or(StringParseError::HexNoDigits)?;
                if let Some(second) = chars.peek().and_then(|c| c.to_digit(16)) {
                    chars.next();
                    num = (num << 4) | second;
                }
                char::from_u32(num).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            first @ '0'..='7' => {
                let mut num = first.to_digit(8).unwrap_or_default();
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            chars.next();
                            num = (num << 3) | digit;
                        }
                        None => break,
                    }
                }
                char::from_u32(num & 0xff).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            other => other,
        };
        out.push(escaped);
    }
    Ok(Cow::Owned(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrowed_without_escapes() {
        assert!(matches!(unescape("okay"), Ok(Cow::Borrowed("okay"))));
    }

    #[test]
    fn escapes() {
        assert_eq!(unescape(r#"a\"b\\c"#).unwrap(), "a\"b\\c");
        assert_eq!(unescape(r"\x4a\x4").unwrap(), "J\x04");
        assert_eq!(unescape(r"\0").unwrap(), "\0");
    }

    #[test]
    fn errors() {
        assert_eq!(
            unescape("abc\\"),
            Err(StringParseError::EscapeAtEndOfString)
        );
        assert_eq!(unescape(r"\xg"), Err(StringParseError::HexNoDigits));
    }
}
