//! HL7 ACK应答生成

use super::escape::escape;
use super::{Delimiters, Message};
use pacs_core::utils::{generate_control_id, hl7_timestamp_now};
use serde::{Deserialize, Serialize};

/// 默认处理ID
const DEFAULT_PROCESSING_ID: &str = "P";
/// 默认版本号
const DEFAULT_VERSION: &str = "2.5";

/// MSA-1 应答代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckCode {
    /// AA：接收并处理成功
    Accept,
    /// AE：消息内容有误
    Error,
    /// AR：消息被拒绝（无法解析）
    Reject,
}

impl AckCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckCode::Accept => "AA",
            AckCode::Error => "AE",
            AckCode::Reject => "AR",
        }
    }
}

/// ACK消息构造器
#[derive(Debug, Clone)]
pub struct AckBuilder {
    sending_application: String,
    sending_facility: String,
}

impl Default for AckBuilder {
    fn default() -> Self {
        Self::new("PACS", "HOSPITAL")
    }
}

impl AckBuilder {
    pub fn new(sending_application: &str, sending_facility: &str) -> Self {
        Self {
            sending_application: sending_application.to_string(),
            sending_facility: sending_facility.to_string(),
        }
    }

    /// 针对已解析的消息生成ACK，沿用原消息声明的分隔符
    pub fn build(&self, original: &Message, code: AckCode, text: Option<&str>) -> String {
        let d = original.delimiters();
        let trigger = original.message_type().trigger.as_deref();
        let message_type = match trigger {
            Some(trigger) => format!("ACK{}{}", d.component, trigger),
            None => "ACK".to_string(),
        };

        self.render(
            d,
            Header {
                receiving_application: original.sending_application().unwrap_or_default(),
                receiving_facility: original.sending_facility().unwrap_or_default(),
                message_type: &message_type,
                processing_id: original.processing_id().unwrap_or(DEFAULT_PROCESSING_ID),
                version: original.version().unwrap_or(DEFAULT_VERSION),
            },
            code,
            original.control_id().unwrap_or_default(),
            text,
        )
    }

    /// 消息无法解析时的拒绝应答，使用标准分隔符
    pub fn build_reject(&self, text: &str) -> String {
        let d = Delimiters::default();
        self.render(
            &d,
            Header {
                receiving_application: "",
                receiving_facility: "",
                message_type: "ACK",
                processing_id: DEFAULT_PROCESSING_ID,
                version: DEFAULT_VERSION,
            },
            AckCode::Reject,
            "",
            Some(text),
        )
    }

    fn render(
        &self,
        d: &Delimiters,
        header: Header<'_>,
        code: AckCode,
        original_control_id: &str,
        text: Option<&str>,
    ) -> String {
        let f = d.field;
        let separator = f.to_string();
        let encoding = d.encoding_characters();
        let sending_application = escape(&self.sending_application, d);
        let sending_facility = escape(&self.sending_facility, d);
        let timestamp = hl7_timestamp_now();
        let control_id = generate_control_id();

        let fields: [&str; 11] = [
            &encoding,
            &sending_application,
            &sending_facility,
            header.receiving_application,
            header.receiving_facility,
            &timestamp,
            "",
            header.message_type,
            &control_id,
            header.processing_id,
            header.version,
        ];
        let msh = fields.join(separator.as_str());

        let mut msa = format!("MSA{f}{}{f}{}", code.as_str(), original_control_id);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            msa.push(f);
            msa.push_str(&escape(text, d));
        }

        format!("MSH{f}{msh}\r{msa}")
    }
}

struct Header<'a> {
    receiving_application: &'a str,
    receiving_facility: &'a str,
    message_type: &'a str,
    processing_id: &'a str,
    version: &'a str,
}
