//! HL7分词器
//!
//! 将消息文本切分为段和字段。分隔符从每条消息的MSH段读取，不使用固定值。

use super::delimiters::HEADER_TAG;
use super::{Delimiters, Hl7Error, Message, MessageType, Segment};
use tracing::debug;

/// MSH-9 消息类型所在位置
const MESSAGE_TYPE_POSITION: usize = 9;

/// HL7解析器
#[derive(Debug, Clone, Default)]
pub struct Hl7Parser;

impl Hl7Parser {
    /// 创建新的HL7解析器
    pub fn new() -> Self {
        Self
    }

    /// 解析HL7消息
    pub fn parse(&self, message: &str) -> Result<Message, Hl7Error> {
        let lines = Self::split_segments(message);
        let header_line = *lines.first().ok_or(Hl7Error::EmptyMessage)?;

        if !header_line.starts_with(HEADER_TAG) {
            return Err(Hl7Error::MissingHeader {
                found: header_line.chars().take(HEADER_TAG.len()).collect(),
            });
        }

        let delimiters = Delimiters::from_header(header_line)?;
        let header = self.parse_header(header_line, delimiters);

        // 位置1~8必须全部存在（允许为空）
        let present = header.field_count();
        if present < MESSAGE_TYPE_POSITION - 1 {
            return Err(Hl7Error::InvalidHeader { present });
        }

        let message_type = header
            .field_ref(MESSAGE_TYPE_POSITION)
            .and_then(|field| MessageType::from_field(&field))
            .ok_or(Hl7Error::MissingMessageType)?;

        let mut segments = Vec::with_capacity(lines.len());
        segments.push(header);
        for line in lines.iter().skip(1) {
            segments.push(self.parse_segment(line, delimiters));
        }

        debug!(
            "Parsed HL7 message {} with {} segments",
            message_type,
            segments.len()
        );

        Ok(Message::new(message_type, delimiters, segments))
    }

    /// 按段终止符切分，CR为标准终止符，同时容忍CRLF与单独的LF
    fn split_segments(message: &str) -> Vec<&str> {
        message
            .trim_start_matches('\u{feff}')
            .split(['\r', '\n'])
            .filter(|line| !line.trim().is_empty())
            .collect()
    }

    /// 解析MSH段：位置1为字段分隔符本身，位置2为编码字符
    fn parse_header(&self, line: &str, delimiters: Delimiters) -> Segment {
        let body = &line[HEADER_TAG.len() + delimiters.field.len_utf8()..];

        let mut fields = vec![HEADER_TAG.to_string(), delimiters.field.to_string()];
        fields.extend(body.split(delimiters.field).map(str::to_string));

        Segment::new(fields, delimiters)
    }

    /// 解析普通段，保留空字段
    fn parse_segment(&self, line: &str, delimiters: Delimiters) -> Segment {
        let fields = line.split(delimiters.field).map(str::to_string).collect();
        Segment::new(fields, delimiters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: &str = "MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|20241215143000||ORM^O01|MSG001|P|2.5\r\
PID|1||12345^^^HOSPITAL^MR||ALBADR^AHMED^MOHAMMAD||19850312|M\r\
ORC|NW|ORD001\r\
OBR|1|ORD001";

    #[test]
    fn test_parse_order() {
        let message = Hl7Parser::new().parse(ORDER).unwrap();

        assert_eq!(message.message_type().key(), "ORM^O01");
        assert_eq!(message.segments().len(), 4);
        assert_eq!(message.header().field(9), Some("ORM^O01"));
        assert_eq!(message.field("PID", 3), Some("12345^^^HOSPITAL^MR"));
        assert_eq!(message.field("PID", 8), Some("M"));
        assert_eq!(message.field("ORC", 2), Some("ORD001"));
    }

    #[test]
    fn test_segment_terminators() {
        let parser = Hl7Parser::new();
        let crlf = ORDER.replace('\r', "\r\n");
        let lf = ORDER.replace('\r', "\n");
        let trailing = format!("{}\r\r\n", ORDER);

        for text in [crlf.as_str(), lf.as_str(), trailing.as_str()] {
            let message = parser.parse(text).unwrap();
            assert_eq!(message.segments().len(), 4);
            assert_eq!(message.field("OBR", 2), Some("ORD001"));
        }
    }

    #[test]
    fn test_empty_message() {
        let parser = Hl7Parser::new();
        assert_eq!(parser.parse("").unwrap_err(), Hl7Error::EmptyMessage);
        assert_eq!(parser.parse("\r\n\r  \r").unwrap_err(), Hl7Error::EmptyMessage);
    }

    #[test]
    fn test_missing_header() {
        let err = Hl7Parser::new().parse("PID|1||12345\rOBR|1").unwrap_err();
        assert_eq!(err, Hl7Error::MissingHeader { found: "PID".to_string() });
    }

    #[test]
    fn test_malformed_header() {
        let err = Hl7Parser::new().parse("MSH|^~\rPID|1").unwrap_err();
        assert_eq!(err.kind(), "MalformedHeader");
    }

    #[test]
    fn test_short_header() {
        let parser = Hl7Parser::new();

        let err = parser.parse("MSH|^~\\&|HIS|HOSPITAL").unwrap_err();
        assert_eq!(err, Hl7Error::InvalidHeader { present: 4 });

        // 位置1~8齐全但没有MSH-9
        let err = parser.parse("MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|20241215143000|").unwrap_err();
        assert_eq!(err, Hl7Error::MissingMessageType);

        let err = parser.parse("MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|20241215143000|||MSG001").unwrap_err();
        assert_eq!(err, Hl7Error::MissingMessageType);
    }

    #[test]
    fn test_declared_delimiters() {
        let text = "MSH#&~\\^#HIS#HOSPITAL#RIS#RADIOLOGY#20241215143000##ORM&O01#MSG001#P#2.5\r\
PID#1##12345&&&HOSPITAL&MR##ALBADR&AHMED^X&MOHAMMAD";
        let message = Hl7Parser::new().parse(text).unwrap();

        assert_eq!(message.message_type().key(), "ORM^O01");
        assert_eq!(message.header().field(1), Some("#"));
        assert_eq!(message.header().field(2), Some("&~\\^"));

        let pid = message.first_segment("PID").unwrap();
        let id = pid.field_ref(3).unwrap();
        assert_eq!(id.component(1), Some("12345"));
        assert_eq!(id.component(4), Some("HOSPITAL"));

        let name = pid.field_ref(5).unwrap();
        assert_eq!(name.components(), vec!["ALBADR", "AHMED^X", "MOHAMMAD"]);
        assert_eq!(name.sub_components(2), vec!["AHMED", "X"]);
    }

    #[test]
    fn test_message_type_without_trigger() {
        let message = Hl7Parser::new()
            .parse("MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|20241215143000||ACK|MSG009|P|2.5\rMSA|AA|MSG001")
            .unwrap();
        assert_eq!(message.message_type().key(), "ACK");
        assert_eq!(message.message_type().trigger, None);
    }
}
