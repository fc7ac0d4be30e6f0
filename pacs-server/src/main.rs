//! PACS HL7网关主程序

mod config;

use crate::config::{ConfigValidator, GatewayConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pacs_integration::{normalize_segment_terminators, parse_message, Hl7Interface, MllpConnection, MllpListener};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// PACS HL7网关命令行参数
#[derive(Parser, Debug)]
#[command(name = "pacs-server")]
#[command(about = "PACS HL7 v2.x MLLP网关")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听主机，覆盖配置文件
    #[arg(long)]
    host: Option<String>,

    /// 监听端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 启动MLLP监听（默认）
    Serve,
    /// 发送文件中的HL7消息并打印ACK
    Send {
        /// 目标地址 host:port
        #[arg(short, long)]
        target: String,

        /// HL7消息文件
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut gateway = GatewayConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        gateway.server.host = host;
    }
    if let Some(port) = args.port {
        gateway.server.port = port;
    }
    let log_level = args.log_level.unwrap_or_else(|| gateway.logging.level.clone());

    // 初始化日志
    tracing_subscriber::fmt().with_env_filter(log_level.as_str()).init();

    info!(
        "Configuration loaded from: {}",
        args.config.as_deref().unwrap_or("defaults and environment")
    );
    ConfigValidator::new().validate(&gateway)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&gateway).await,
        Command::Send { target, file } => send(&gateway, &target, &file).await,
    }
}

async fn serve(gateway: &GatewayConfig) -> Result<()> {
    info!("启动HL7网关...");
    info!("  监听地址: {}:{}", gateway.server.host, gateway.server.port);
    info!("  最大连接数: {}", gateway.server.max_connections);
    info!("  空闲超时: {} ms", gateway.mllp.idle_timeout_ms);

    let validator = gateway.validator();
    for message_type in validator.rules().message_types() {
        info!("  校验规则: {}", message_type);
    }

    let interface = Hl7Interface::new(validator, gateway.ack_builder());
    let listener = MllpListener::new(gateway.listener_config(), interface);

    tokio::select! {
        result = listener.start() => {
            if let Err(e) = result {
                error!("网关启动失败: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn send(gateway: &GatewayConfig, target: &str, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let message = normalize_segment_terminators(text.trim_end());

    let result = gateway.validator().validate_message(&message);
    if result.is_valid {
        info!("Local validation: {}", result.get_summary());
    } else {
        warn!("Local validation: {}", result.get_summary());
    }

    let mut connection = MllpConnection::connect(target, gateway.connect_timeout())
        .await
        .with_context(|| format!("Failed to connect to {}", target))?;
    let reply = connection
        .send_and_await_reply(&message, gateway.response_timeout())
        .await
        .context("No acknowledgement received")?;
    let ack = reply.into_text()?;

    match parse_message(&ack) {
        Ok(parsed) => info!(
            "ACK {} for control id {}",
            parsed.field("MSA", 1).unwrap_or("?"),
            parsed.field("MSA", 2).unwrap_or("?")
        ),
        Err(e) => warn!("Reply is not a valid HL7 message: {}", e),
    }
    println!("{}", ack.replace('\r', "\n"));

    Ok(())
}
