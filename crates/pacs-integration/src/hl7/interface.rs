//! HL7接口处理器
//!
//! 串联解析、校验和ACK生成，供MLLP监听器和HTTP层调用。

use super::{AckBuilder, AckCode, Hl7Outcome, Hl7Validator, Message};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// 下游消息日志中的处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Processed,
    Error,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Processed => write!(f, "PROCESSED"),
            MessageStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// 单条消息的处理结果
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    pub outcome: Hl7Outcome,
    pub status: MessageStatus,
    pub ack_code: AckCode,
    /// 回复给发送方的ACK文本
    pub ack: String,
}

/// HL7接口处理器
#[derive(Debug, Clone, Default)]
pub struct Hl7Interface {
    validator: Hl7Validator,
    ack_builder: AckBuilder,
}

impl Hl7Interface {
    /// 创建新的HL7接口
    pub fn new(validator: Hl7Validator, ack_builder: AckBuilder) -> Self {
        Self {
            validator,
            ack_builder,
        }
    }

    pub fn validator(&self) -> &Hl7Validator {
        &self.validator
    }

    /// 处理接收到的HL7消息
    pub fn process_message(&self, text: &str) -> ProcessedMessage {
        debug!(
            "Processing HL7 message: {}",
            text.chars().take(100).collect::<String>()
        );

        let outcome = self.validator.check(text);
        let (ack_code, ack) = match &outcome {
            Hl7Outcome::ParseFailure(error) => (AckCode::Reject, self.ack_builder.build_reject(&error.to_string())),
            Hl7Outcome::Validated { message, result } if result.is_valid => {
                (AckCode::Accept, self.generate_ack(message, AckCode::Accept, None))
            }
            Hl7Outcome::Validated { message, result } => {
                let text = result.errors.join("; ");
                (AckCode::Error, self.generate_ack(message, AckCode::Error, Some(&text)))
            }
        };

        let status = if outcome.is_valid() {
            MessageStatus::Processed
        } else {
            MessageStatus::Error
        };

        match outcome.message() {
            Some(message) => info!(
                "HL7 message {} ({}) processed with status {}",
                message.message_type(),
                message.control_id().unwrap_or("-"),
                status
            ),
            None => warn!("Rejected unparseable HL7 message"),
        }

        ProcessedMessage {
            outcome,
            status,
            ack_code,
            ack,
        }
    }

    /// 生成HL7 ACK消息
    pub fn generate_ack(&self, original_message: &Message, code: AckCode, text: Option<&str>) -> String {
        self.ack_builder.build(original_message, code, text)
    }
}
