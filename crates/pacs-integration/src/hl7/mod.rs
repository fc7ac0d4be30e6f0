//! HL7接口模块
//!
//! 实现与HIS/RIS系统之间的HL7 v2.x消息处理：
//! - 按消息自身MSH声明的分隔符进行分词（段、字段、组件、重复、子组件）
//! - 结构化消息模型（按段类型索引，按位置取字段）
//! - 必需段规则校验，解析失败与校验失败分开报告
//! - ACK应答生成

pub mod ack;
pub mod delimiters;
pub mod escape;
pub mod interface;
pub mod message;
pub mod parser;
pub mod validator;

pub use ack::{AckBuilder, AckCode};
pub use delimiters::Delimiters;
pub use interface::{Hl7Interface, MessageStatus, ProcessedMessage};
pub use message::{Field, Message, MessageType, Segment};
pub use parser::Hl7Parser;
pub use validator::{Hl7Outcome, Hl7Validator, RequiredSegmentRules, SegmentRule, ValidationResult};

use thiserror::Error;

/// HL7解析失败
///
/// 解析失败意味着无法构造出 [`Message`]，校验时以单条错误的结果返回。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Hl7Error {
    #[error("EmptyMessage")]
    EmptyMessage,
    #[error("MissingHeader({found})")]
    MissingHeader { found: String },
    #[error("MalformedHeader({0})")]
    MalformedHeader(String),
    #[error("InvalidHeader(MSH has {present} of 8 required fields)")]
    InvalidHeader { present: usize },
    #[error("MissingMessageType")]
    MissingMessageType,
}

impl Hl7Error {
    /// 错误类别名称，不含细节
    pub fn kind(&self) -> &'static str {
        match self {
            Hl7Error::EmptyMessage => "EmptyMessage",
            Hl7Error::MissingHeader { .. } => "MissingHeader",
            Hl7Error::MalformedHeader(_) => "MalformedHeader",
            Hl7Error::InvalidHeader { .. } => "InvalidHeader",
            Hl7Error::MissingMessageType => "MissingMessageType",
        }
    }
}

impl From<Hl7Error> for pacs_core::PacsError {
    fn from(err: Hl7Error) -> Self {
        pacs_core::PacsError::Hl7(err.to_string())
    }
}

/// 使用默认解析器解析HL7消息
pub fn parse_message(text: &str) -> Result<Message, Hl7Error> {
    Hl7Parser::new().parse(text)
}

/// 使用默认必需段规则校验HL7消息文本
pub fn validate_message(text: &str) -> ValidationResult {
    Hl7Validator::default().validate_message(text)
}

/// 将换行符统一为HL7段终止符 (CR)
///
/// 从文件或终端读入的消息通常以LF或CRLF分行，发送前需要转换。
pub fn normalize_segment_terminators(text: &str) -> String {
    text.replace("\r\n", "\r").replace('\n', "\r")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_matches_kind() {
        assert_eq!(Hl7Error::EmptyMessage.to_string(), "EmptyMessage");
        assert_eq!(Hl7Error::MissingMessageType.to_string(), "MissingMessageType");
        assert_eq!(
            Hl7Error::MissingHeader { found: "PID".to_string() }.to_string(),
            "MissingHeader(PID)"
        );

        let err = Hl7Error::InvalidHeader { present: 3 };
        assert_eq!(err.kind(), "InvalidHeader");
        assert!(err.to_string().starts_with("InvalidHeader("));
    }

    #[test]
    fn test_normalize_segment_terminators() {
        assert_eq!(normalize_segment_terminators("MSH|a\r\nPID|b\nOBR|c"), "MSH|a\rPID|b\rOBR|c");
        assert_eq!(normalize_segment_terminators("MSH|a\rPID|b"), "MSH|a\rPID|b");
    }

    #[test]
    fn test_pacs_error_conversion() {
        let err: pacs_core::PacsError = Hl7Error::EmptyMessage.into();
        assert!(matches!(err, pacs_core::PacsError::Hl7(ref msg) if msg == "EmptyMessage"));
    }
}
