//! 网关配置
//!
//! 配置来源按优先级从低到高：内置默认值、配置文件、`PACS_` 前缀的环境变量
//! （层级用双下划线分隔，例如 `PACS_SERVER__PORT=6662`）。

use ::config::{Config, Environment, File};
use anyhow::{Context, Result};
use pacs_core::PacsError;
use pacs_integration::hl7::{AckBuilder, Hl7Validator, RequiredSegmentRules, SegmentRule};
use pacs_integration::mllp::DEFAULT_MAX_FRAME_LENGTH;
use pacs_integration::MllpListenerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{error, info};

/// 网关完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// MLLP监听配置
    pub server: ServerConfig,
    /// MLLP传输配置
    pub mllp: MllpConfig,
    /// 校验规则配置
    pub validation: ValidationConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 最大并发连接数
    pub max_connections: usize,
    /// ACK中的发送应用 (MSH-3)
    pub sending_application: String,
    /// ACK中的发送机构 (MSH-4)
    pub sending_facility: String,
}

/// MLLP传输配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MllpConfig {
    /// 等待应答的超时时间（毫秒）
    pub response_timeout_ms: u64,
    /// 建立连接的超时时间（毫秒）
    pub connect_timeout_ms: u64,
    /// 连接空闲超时（毫秒），超时后监听器关闭该连接
    pub idle_timeout_ms: u64,
    /// 最大帧长度（字节）
    pub max_frame_length: usize,
}

/// 校验规则配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// 是否包含内置的ORM^O01/ORU^R01/MDM^T02规则
    pub include_default_rules: bool,
    /// 追加或覆盖的规则
    pub rules: Vec<SegmentRule>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或过滤表达式
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6661,
            max_connections: 100,
            sending_application: "PACS".to_string(),
            sending_facility: "HOSPITAL".to_string(),
        }
    }
}

impl Default for MllpConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            idle_timeout_ms: 300_000,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            include_default_rules: true,
            rules: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ValidationConfig {
    /// 组合出最终的必需段规则表
    pub fn required_segment_rules(&self) -> RequiredSegmentRules {
        let mut rules = if self.include_default_rules {
            RequiredSegmentRules::default()
        } else {
            RequiredSegmentRules::empty()
        };
        rules.merge(RequiredSegmentRules::from(self.rules.clone()));
        rules
    }
}

impl GatewayConfig {
    /// 加载配置，`path` 为空时只使用默认值和环境变量
    ///
    /// 加载时日志尚未初始化，结果需再经 [`ConfigValidator`] 验证。
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("PACS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn listener_config(&self) -> MllpListenerConfig {
        MllpListenerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            max_connections: self.server.max_connections,
            max_frame_length: self.mllp.max_frame_length,
            idle_timeout: Duration::from_millis(self.mllp.idle_timeout_ms),
        }
    }

    pub fn validator(&self) -> Hl7Validator {
        Hl7Validator::new(self.validation.required_segment_rules())
    }

    pub fn ack_builder(&self) -> AckBuilder {
        AckBuilder::new(&self.server.sending_application, &self.server.sending_facility)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.mllp.response_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.mllp.connect_timeout_ms)
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&GatewayConfig) -> std::result::Result<(), String>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| {
                    if config.server.port == 0 {
                        Err("must be between 1 and 65535".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "server.max_connections",
                validator: |config| {
                    if config.server.max_connections == 0 {
                        Err("must be greater than 0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "mllp.response_timeout_ms",
                validator: |config| {
                    if config.mllp.response_timeout_ms == 0 {
                        Err("must be greater than 0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "mllp.idle_timeout_ms",
                validator: |config| {
                    if config.mllp.idle_timeout_ms == 0 {
                        Err("must be greater than 0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "mllp.max_frame_length",
                validator: |config| {
                    if config.mllp.max_frame_length == 0 {
                        Err("must be greater than 0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "validation.rules",
                validator: |config| {
                    let mut seen = HashSet::new();
                    for rule in &config.validation.rules {
                        if rule.message_type.trim().is_empty() {
                            return Err("message_type cannot be empty".to_string());
                        }
                        if rule.segments.is_empty() {
                            return Err(format!("{} has no segments", rule.message_type));
                        }
                        if !seen.insert(rule.message_type.as_str()) {
                            return Err(format!("duplicate rule for {}", rule.message_type));
                        }
                    }
                    Ok(())
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &GatewayConfig) -> pacs_core::Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(PacsError::Config(format!("{}: {}", rule.field_path, e)));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}
