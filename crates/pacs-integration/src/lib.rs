//! # PACS集成模块
//!
//! 提供与HIS/RIS及集成引擎之间的HL7 v2.x通信，包括：
//! - HL7消息分词、结构化模型与必需段校验
//! - MLLP帧编解码、请求/应答交换
//! - MLLP监听器，按连接并发处理并回复ACK

pub mod hl7;
pub mod listener;
pub mod mllp;

pub use hl7::{
    normalize_segment_terminators, parse_message, validate_message, Hl7Error, Hl7Interface, Hl7Outcome, Hl7Parser,
    Hl7Validator, Message, RequiredSegmentRules, SegmentRule, ValidationResult,
};
pub use listener::{MessageHandler, MllpListener, MllpListenerConfig};
pub use mllp::{send_and_await_reply, wrap, MllpCodec, MllpConnection, MllpError, RawFrame};
