//! MLLP帧处理
//!
//! 帧格式：`0x0B <消息文本> 0x1C 0x0D`，没有长度前缀，仅靠起止标记定界。
//! 每个连接独占自己的缓冲区，超时只取消正在进行的等待，不改变连接状态，
//! 也不会重发请求，重试策略由调用方决定。

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, warn};

/// 帧起始标记 (VT)
pub const START_BLOCK: u8 = 0x0B;
/// 帧结束标记 (FS)
pub const END_BLOCK: u8 = 0x1C;
/// 结束标记后的回车
pub const CARRIAGE_RETURN: u8 = 0x0D;
/// 默认最大帧长度 (1 MiB)
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum MllpError {
    #[error("IncompleteFrame: stream ended with {buffered} bytes of an unterminated frame")]
    IncompleteFrame { buffered: usize },
    #[error("ResponseTimeout: no reply frame within {0:?}")]
    ResponseTimeout(Duration),
    #[error("ConnectionClosed")]
    ConnectionClosed,
    #[error("FrameTooLarge: frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },
    #[error("InvalidEncoding: {0}")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),
    #[error("Io: {0}")]
    Io(#[from] std::io::Error),
}

impl MllpError {
    /// 调用方可以用新的尝试重新发起交换的故障
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MllpError::IncompleteFrame { .. } | MllpError::ResponseTimeout(_) | MllpError::ConnectionClosed
        )
    }
}

impl From<MllpError> for pacs_core::PacsError {
    fn from(err: MllpError) -> Self {
        match err {
            MllpError::Io(e) => pacs_core::PacsError::Network(e),
            other => pacs_core::PacsError::Transport(other.to_string()),
        }
    }
}

/// 给消息文本加上MLLP封装
pub fn wrap(message: &str) -> Vec<u8> {
    let mut framed = Vec::with_capacity(message.len() + 3);
    framed.push(START_BLOCK);
    framed.extend_from_slice(message.as_bytes());
    framed.push(END_BLOCK);
    framed.push(CARRIAGE_RETURN);
    framed
}

/// 起止标记之间的原始字节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame(Bytes);

impl RawFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// 按UTF-8解码为消息文本
    pub fn into_text(self) -> Result<String, MllpError> {
        Ok(String::from_utf8(self.0.to_vec())?)
    }
}

impl From<&str> for RawFrame {
    fn from(text: &str) -> Self {
        RawFrame(Bytes::copy_from_slice(text.as_bytes()))
    }
}

/// MLLP编解码器
#[derive(Debug, Clone)]
pub struct MllpCodec {
    max_frame_length: usize,
}

impl Default for MllpCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl MllpCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }
}

/// 查找结束标记 `0x1C 0x0D` 的位置
fn find_end(body: &[u8]) -> Option<usize> {
    body.windows(2)
        .position(|w| w[0] == END_BLOCK && w[1] == CARRIAGE_RETURN)
}

impl Decoder for MllpCodec {
    type Item = RawFrame;
    type Error = MllpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // 丢弃第一个起始标记之前的字节
        match src.iter().position(|&b| b == START_BLOCK) {
            Some(0) => {}
            Some(pos) => {
                warn!("Discarding {} bytes before MLLP start block", pos);
                src.advance(pos);
            }
            None => {
                if !src.is_empty() {
                    warn!("Discarding {} bytes without MLLP start block", src.len());
                    src.clear();
                }
                return Ok(None);
            }
        }

        let Some(end) = find_end(&src[1..]) else {
            // 结束标记可能被拆在两次读取之间，末尾的0x1C不计入帧长
            let pending = src.len() - 1 - usize::from(src.len() > 1 && src.last() == Some(&END_BLOCK));
            if pending > self.max_frame_length {
                return Err(MllpError::FrameTooLarge {
                    limit: self.max_frame_length,
                });
            }
            return Ok(None);
        };

        // 帧内再次出现起始标记说明前一帧被截断，从最后一个起始标记重新同步
        let resync = src[1..1 + end].iter().rposition(|&b| b == START_BLOCK);
        let (skip, length) = match resync {
            Some(pos) => {
                warn!("Dropping truncated MLLP frame of {} bytes", pos);
                (pos + 2, end - pos - 1)
            }
            None => (1, end),
        };

        if length > self.max_frame_length {
            return Err(MllpError::FrameTooLarge {
                limit: self.max_frame_length,
            });
        }

        src.advance(skip);
        let payload = src.split_to(length).freeze();
        src.advance(2);

        debug!("Decoded MLLP frame of {} bytes", payload.len());
        Ok(Some(RawFrame(payload)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(MllpError::IncompleteFrame { buffered: buf.len() }),
        }
    }
}

impl Encoder<&str> for MllpCodec {
    type Error = MllpError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_length {
            return Err(MllpError::FrameTooLarge {
                limit: self.max_frame_length,
            });
        }
        dst.reserve(item.len() + 3);
        dst.put_u8(START_BLOCK);
        dst.put_slice(item.as_bytes());
        dst.put_u8(END_BLOCK);
        dst.put_u8(CARRIAGE_RETURN);
        Ok(())
    }
}

/// 单个MLLP连接，独占底层流及其缓冲区
#[derive(Debug)]
pub struct MllpConnection<S> {
    framed: Framed<S, MllpCodec>,
}

impl MllpConnection<TcpStream> {
    /// 建立TCP连接
    pub async fn connect<A: ToSocketAddrs>(addr: A, connect_timeout: Duration) -> Result<Self, MllpError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                MllpError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", connect_timeout),
                ))
            })??;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S> MllpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_codec(stream, MllpCodec::default())
    }

    pub fn with_codec(stream: S, codec: MllpCodec) -> Self {
        Self {
            framed: Framed::new(stream, codec),
        }
    }

    /// 读取下一帧；对端正常关闭且没有残留数据时返回 `None`
    pub async fn next_frame(&mut self) -> Result<Option<RawFrame>, MllpError> {
        self.framed.next().await.transpose()
    }

    /// 读取一帧，对端关闭视为错误
    pub async fn read_frame(&mut self) -> Result<RawFrame, MllpError> {
        self.next_frame().await?.ok_or(MllpError::ConnectionClosed)
    }

    /// 发送一条消息
    pub async fn send(&mut self, message: &str) -> Result<(), MllpError> {
        self.framed.send(message).await
    }

    /// 发送消息并在超时时间内等待一帧应答
    pub async fn send_and_await_reply(&mut self, message: &str, timeout: Duration) -> Result<RawFrame, MllpError> {
        self.send(message).await?;
        match tokio::time::timeout(timeout, self.read_frame()).await {
            Ok(reply) => reply,
            Err(_) => {
                warn!("No MLLP reply within {:?}", timeout);
                Err(MllpError::ResponseTimeout(timeout))
            }
        }
    }

    pub fn get_ref(&self) -> &S {
        self.framed.get_ref()
    }

    pub fn into_inner(self) -> S {
        self.framed.into_inner()
    }
}

/// 发送消息并等待应答
pub async fn send_and_await_reply<S>(
    connection: &mut MllpConnection<S>,
    message: &str,
    timeout: Duration,
) -> Result<RawFrame, MllpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    connection.send_and_await_reply(message, timeout).await
}
