//! 错误定义模块

use thiserror::Error;

/// PACS系统统一错误类型
#[derive(Error, Debug)]
pub enum PacsError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("HL7解析错误: {0}")]
    Hl7(String),

    #[error("MLLP传输错误: {0}")]
    Transport(String),

    #[error("网络错误: {0}")]
    Network(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// PACS系统统一结果类型
pub type Result<T> = std::result::Result<T, PacsError>;
