//! HL7转义序列
//!
//! 支持的序列（以 `\` 作为转义字符为例）：
//! `\F\` 字段分隔符，`\S\` 组件分隔符，`\T\` 子组件分隔符，
//! `\R\` 重复分隔符，`\E\` 转义字符，`\Xhh..\` 十六进制字节。
//! 其余序列（如 `\H\`、`\N\` 格式化指令）原样保留。

use super::Delimiters;
use std::borrow::Cow;

/// 解码字段文本中的转义序列
pub fn unescape<'a>(text: &'a str, delimiters: &Delimiters) -> Cow<'a, str> {
    let esc = delimiters.escape;
    if !text.contains(esc) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(esc) {
        out.push_str(&rest[..start]);
        let after = &rest[start + esc.len_utf8()..];

        let Some(end) = after.find(esc) else {
            // 未闭合的转义保持原文
            out.push_str(&rest[start..]);
            return Cow::Owned(out);
        };

        let sequence = &after[..end];
        match decode_sequence(sequence, delimiters) {
            Some(decoded) => out.push_str(&decoded),
            None => {
                out.push(esc);
                out.push_str(sequence);
                out.push(esc);
            }
        }
        rest = &after[end + esc.len_utf8()..];
    }

    out.push_str(rest);
    Cow::Owned(out)
}

/// 将文本中的分隔符与段终止符转换为转义序列
pub fn escape<'a>(text: &'a str, delimiters: &Delimiters) -> Cow<'a, str> {
    let needs_escape = text.chars().any(|c| {
        c == delimiters.field
            || c == delimiters.component
            || c == delimiters.repetition
            || c == delimiters.escape
            || c == delimiters.subcomponent
            || c == '\r'
            || c == '\n'
    });
    if !needs_escape {
        return Cow::Borrowed(text);
    }

    let esc = delimiters.escape;
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        let code = match c {
            c if c == delimiters.field => "F",
            c if c == delimiters.component => "S",
            c if c == delimiters.subcomponent => "T",
            c if c == delimiters.repetition => "R",
            c if c == esc => "E",
            '\r' => "X0D",
            '\n' => "X0A",
            _ => {
                out.push(c);
                continue;
            }
        };
        out.push(esc);
        out.push_str(code);
        out.push(esc);
    }
    Cow::Owned(out)
}

fn decode_sequence(sequence: &str, delimiters: &Delimiters) -> Option<String> {
    let decoded = match sequence {
        "F" => delimiters.field.to_string(),
        "S" => delimiters.component.to_string(),
        "T" => delimiters.subcomponent.to_string(),
        "R" => delimiters.repetition.to_string(),
        "E" => delimiters.escape.to_string(),
        hex if hex.starts_with('X') => decode_hex(&hex[1..])?,
        _ => return None,
    };
    Some(decoded)
}

fn decode_hex(digits: &str) -> Option<String> {
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_delimiters() {
        let d = Delimiters::default();
        assert_eq!(unescape("A\\F\\B", &d), "A|B");
        assert_eq!(unescape("\\S\\\\T\\\\R\\\\E\\", &d), "^&~\\");
        assert!(matches!(unescape("plain text", &d), Cow::Borrowed(_)));
    }

    #[test]
    fn test_unescape_hex_and_unknown() {
        let d = Delimiters::default();
        assert_eq!(unescape("line1\\X0D\\line2", &d), "line1\rline2");
        assert_eq!(unescape("\\H\\bold\\N\\", &d), "\\H\\bold\\N\\");
        assert_eq!(unescape("\\XZZ\\", &d), "\\XZZ\\");
        assert_eq!(unescape("broken \\F", &d), "broken \\F");
    }

    #[test]
    fn test_unescape_declared_escape_character() {
        let d = Delimiters {
            escape: '!',
            ..Delimiters::default()
        };
        assert_eq!(unescape("A!F!B", &d), "A|B");
        assert_eq!(unescape("A\\F\\B", &d), "A\\F\\B");
    }

    #[test]
    fn test_escape_is_inverse() {
        let d = Delimiters::default();
        let text = "Result: 5|10 ^ a&b ~ c\\d\rnext";
        let escaped = escape(text, &d);
        assert_eq!(escaped, "Result: 5\\F\\10 \\S\\ a\\T\\b \\R\\ c\\E\\d\\X0D\\next");
        assert_eq!(unescape(&escaped, &d), text);
        assert!(matches!(escape("nothing to do", &d), Cow::Borrowed(_)));
    }
}
