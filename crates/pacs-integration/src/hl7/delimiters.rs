//! HL7分隔符
//!
//! 分隔符由每条消息的MSH段自行声明：`MSH` 之后的第一个字符为字段分隔符，
//! 随后四个字符依次为组件、重复、转义、子组件分隔符。

use super::Hl7Error;
use serde::{Deserialize, Serialize};

/// 消息头段标识
pub const HEADER_TAG: &str = "MSH";

/// HL7分隔符集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delimiters {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

impl Delimiters {
    /// 从MSH段文本读取分隔符声明
    pub fn from_header(segment: &str) -> Result<Self, Hl7Error> {
        let declared = segment.strip_prefix(HEADER_TAG).ok_or_else(|| Hl7Error::MissingHeader {
            found: segment.chars().take(HEADER_TAG.len()).collect(),
        })?;

        let mut chars = declared.chars();
        let field = chars
            .next()
            .ok_or_else(|| Hl7Error::MalformedHeader("missing field separator".to_string()))?;

        let encoding: Vec<char> = chars.take(4).collect();
        if encoding.len() < 4 {
            return Err(Hl7Error::MalformedHeader(format!(
                "expected 4 encoding characters, found {}",
                encoding.len()
            )));
        }

        let delimiters = Self {
            field,
            component: encoding[0],
            repetition: encoding[1],
            escape: encoding[2],
            subcomponent: encoding[3],
        };
        delimiters.check_distinct()?;

        Ok(delimiters)
    }

    /// MSH-2 编码字符，顺序为组件、重复、转义、子组件
    pub fn encoding_characters(&self) -> String {
        [self.component, self.repetition, self.escape, self.subcomponent]
            .iter()
            .collect()
    }

    fn as_array(&self) -> [char; 5] {
        [self.field, self.component, self.repetition, self.escape, self.subcomponent]
    }

    fn check_distinct(&self) -> Result<(), Hl7Error> {
        let all = self.as_array();
        for (i, c) in all.iter().enumerate() {
            if matches!(c, '\r' | '\n') {
                return Err(Hl7Error::MalformedHeader(
                    "segment terminator declared as delimiter".to_string(),
                ));
            }
            if all[i + 1..].contains(c) {
                return Err(Hl7Error::MalformedHeader(format!("duplicate delimiter '{}'", c)));
            }
        }
        Ok(())
    }
}
