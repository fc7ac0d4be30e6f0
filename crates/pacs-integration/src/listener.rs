//! MLLP监听器
//!
//! 每个TCP连接在独立任务中处理，互不共享缓冲区。解析或校验失败只影响
//! 当前消息，传输故障只关闭当前连接。

use crate::hl7::{AckBuilder, Hl7Interface};
use crate::mllp::{MllpCodec, MllpConnection, MllpError, RawFrame, DEFAULT_MAX_FRAME_LENGTH};
use async_trait::async_trait;
use pacs_core::{PacsError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// 消息处理接口，返回值为需要回复给发送方的消息文本
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle_frame(&self, frame: RawFrame, remote_addr: SocketAddr) -> Option<String>;
}

#[async_trait]
impl MessageHandler for Hl7Interface {
    async fn handle_frame(&self, frame: RawFrame, remote_addr: SocketAddr) -> Option<String> {
        match frame.into_text() {
            Ok(text) => {
                let processed = self.process_message(&text);
                debug!(
                    "Replying {} to {} with status {}",
                    processed.ack_code.as_str(),
                    remote_addr,
                    processed.status
                );
                Some(processed.ack)
            }
            Err(e) => {
                warn!("Frame from {} is not valid UTF-8: {}", remote_addr, e);
                Some(AckBuilder::default().build_reject(&e.to_string()))
            }
        }
    }
}

/// 默认空闲超时
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// accept失败后的退避时间
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// MLLP监听器配置
#[derive(Debug, Clone)]
pub struct MllpListenerConfig {
    pub host: String,
    pub port: u16,
    /// 同时处理的最大连接数
    pub max_connections: usize,
    pub max_frame_length: usize,
    /// 连接上等待下一帧的最长时间，超时后关闭连接并释放名额
    pub idle_timeout: Duration,
}

impl Default for MllpListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6661,
            max_connections: 100,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// MLLP监听器
pub struct MllpListener<H> {
    config: MllpListenerConfig,
    handler: Arc<H>,
    limiter: Arc<Semaphore>,
}

impl<H> Clone for MllpListener<H> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            handler: Arc::clone(&self.handler),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<H: MessageHandler> MllpListener<H> {
    pub fn new(config: MllpListenerConfig, handler: H) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Self {
            config,
            handler: Arc::new(handler),
            limiter,
        }
    }

    pub fn config(&self) -> &MllpListenerConfig {
        &self.config
    }

    /// 绑定监听地址
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("MLLP listener bound to {}", listener.local_addr()?);
        Ok(listener)
    }

    /// 绑定并开始接受连接
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// 在已绑定的监听套接字上接受连接
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let permit = Arc::clone(&self.limiter)
                .acquire_owned()
                .await
                .map_err(|e| PacsError::Internal(format!("connection limiter closed: {}", e)))?;

            match listener.accept().await {
                Ok((stream, remote_addr)) => {
                    info!("Accepted MLLP connection from {}", remote_addr);
                    let handler = Arc::clone(&self.handler);
                    let codec = MllpCodec::new(self.config.max_frame_length);
                    let idle_timeout = self.config.idle_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(handler, stream, remote_addr, codec, idle_timeout).await {
                            error!("MLLP connection {} failed: {}", remote_addr, e);
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Failed to accept MLLP connection: {}", e);
                    drop(permit);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// 处理单个连接上的所有帧
async fn handle_connection<H: MessageHandler>(
    handler: Arc<H>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    codec: MllpCodec,
    idle_timeout: Duration,
) -> std::result::Result<(), MllpError> {
    stream.set_nodelay(true)?;
    let mut connection = MllpConnection::with_codec(stream, codec);

    loop {
        let frame = match tokio::time::timeout(idle_timeout, connection.next_frame()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!("MLLP connection {} idle for {:?}, closing", remote_addr, idle_timeout);
                return Ok(());
            }
        };

        debug!("Received {} byte frame from {}", frame.len(), remote_addr);
        if let Some(reply) = handler.handle_frame(frame, remote_addr).await {
            connection.send(&reply).await?;
        }
    }

    debug!("MLLP connection closed: {}", remote_addr);
    Ok(())
}
