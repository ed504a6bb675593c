// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/output/telemetry.rs - TCP 遥测发布
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group


//! 发布-订阅遥测通道。
//!
//! 消息体为 `metadata JSON || ":::" || JPEG`，在 TCP 上以 4 字节大端长度前缀分帧。
//! 发布端运行在自带的 tokio 运行时上，所有订阅者共享一个广播通道。
//! 每个订阅者至多持有一条正在写出的消息和 `DEFAULT_QUEUE_DEPTH - 1` 条排队消息，
//! 落后时丢弃最旧的消息，生产者从不阻塞。
//!
//! 注意：长度前缀分帧不是 ZeroMQ 的 ZMTP 协议，ZeroMQ SUB 套接字无法直接订阅。
//! 转发到 Web 前端的桥接程序需按 [`TelemetrySubscriber`] 的分帧方式读取。

use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Publish,
  violation::StatsSnapshot,
};

pub const MESSAGE_DELIMITER: &[u8] = b":::";
pub const DEFAULT_TELEMETRY_PORT: u16 = 5555;
pub const DEFAULT_QUEUE_DEPTH: usize = 2;
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

const ACCEPT_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum TelemetryError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("元数据序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("消息格式错误: {0}")]
  MalformedMessage(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMetadata {
  pub frame_count: u64,
  pub light_status: String,
  pub total_vehicles: u64,
  pub red_light_runners: u64,
  pub run_rate: f64,
}

impl From<&StatsSnapshot> for TelemetryMetadata {
  fn from(snapshot: &StatsSnapshot) -> Self {
    Self {
      frame_count: snapshot.frame_count,
      light_status: snapshot.light_status.as_str().to_string(),
      total_vehicles: snapshot.total_vehicles_seen,
      red_light_runners: snapshot.red_light_runner_count,
      run_rate: snapshot.run_rate,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryMessage {
  pub metadata: TelemetryMetadata,
  pub image: Vec<u8>,
}

pub fn encode_message(metadata: &TelemetryMetadata, image: &[u8]) -> Result<Vec<u8>, TelemetryError> {
  let mut message = serde_json::to_vec(metadata)?;
  message.reserve(MESSAGE_DELIMITER.len() + image.len());
  message.extend_from_slice(MESSAGE_DELIMITER);
  message.extend_from_slice(image);
  Ok(message)
}

/// 在第一个分隔符处拆分，图像数据中可以出现分隔符字节
pub fn decode_message(message: &[u8]) -> Result<TelemetryMessage, TelemetryError> {
  let split = message
    .windows(MESSAGE_DELIMITER.len())
    .position(|w| w == MESSAGE_DELIMITER)
    .ok_or_else(|| TelemetryError::MalformedMessage("缺少分隔符".to_string()))?;

  let metadata = serde_json::from_slice(&message[..split])?;
  let image = message[split + MESSAGE_DELIMITER.len()..].to_vec();
  Ok(TelemetryMessage { metadata, image })
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, TelemetryError> {
  let mut buffer = Vec::new();
  JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(frame)?;
  Ok(buffer)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Message = Arc<[u8]>;

pub struct TelemetryPublisher {
  local_addr: SocketAddr,
  sender: broadcast::Sender<Message>,
  runtime: Mutex<Option<Runtime>>,
  quality: u8,
}

impl FromUrlWithScheme for TelemetryPublisher {
  const SCHEME: &'static str = "tcp";
}

impl FromUrl for TelemetryPublisher {
  type Error = TelemetryError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TelemetryError::SchemeMismatch);
    }

    let host = url.host_str().unwrap_or("0.0.0.0");
    let port = url.port().unwrap_or(DEFAULT_TELEMETRY_PORT);
    let quality = url
      .query_pairs()
      .find(|(k, _)| k == "quality")
      .and_then(|(_, v)| v.parse().ok())
      .unwrap_or(DEFAULT_JPEG_QUALITY);

    Ok(TelemetryPublisher::bind((host, port))?.with_quality(quality))
  }
}

impl TelemetryPublisher {
  /// 在独立的运行时上监听，调用方保持同步
  pub fn bind(addr: impl tokio::net::ToSocketAddrs) -> Result<Self, TelemetryError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .worker_threads(2)
      .thread_name("hongdeng-telemetry")
      .enable_all()
      .build()?;

    let listener = runtime.block_on(TcpListener::bind(addr))?;
    let local_addr = listener.local_addr()?;

    // 正在写出的那条消息占一个名额，通道里只留剩下的
    let (sender, _) = broadcast::channel((DEFAULT_QUEUE_DEPTH - 1).max(1));
    runtime.spawn(accept_loop(listener, sender.clone()));

    info!("遥测发布已监听: tcp://{}", local_addr);

    Ok(TelemetryPublisher {
      local_addr,
      sender,
      runtime: Mutex::new(Some(runtime)),
      quality: DEFAULT_JPEG_QUALITY,
    })
  }

  pub fn with_quality(mut self, quality: u8) -> Self {
    self.quality = quality.clamp(1, 100);
    self
  }

  pub fn local_addr(&self) -> SocketAddr {
    self.local_addr
  }

  pub fn subscriber_count(&self) -> usize {
    self.sender.receiver_count()
  }

  pub fn is_closed(&self) -> bool {
    lock(&self.runtime).is_none()
  }

  /// 把已编码的消息交给所有订阅者
  pub fn publish_bytes(&self, message: Vec<u8>) {
    if self.is_closed() {
      debug!("遥测发布已关闭，丢弃消息");
      return;
    }

    if self.sender.send(message.into()).is_err() {
      debug!("当前没有遥测订阅者");
    }
  }

  /// 关闭监听与所有订阅连接，不等待未写完的消息
  pub fn close(&self) {
    let Some(runtime) = lock(&self.runtime).take() else {
      return;
    };
    runtime.shutdown_background();
    info!("遥测发布已关闭: tcp://{}", self.local_addr);
  }
}

impl Publish for TelemetryPublisher {
  type Error = TelemetryError;

  fn publish(&self, frame: &RgbImage, snapshot: &StatsSnapshot) -> Result<(), Self::Error> {
    let jpeg = encode_jpeg(frame, self.quality)?;
    let message = encode_message(&TelemetryMetadata::from(snapshot), &jpeg)?;
    self.publish_bytes(message);
    Ok(())
  }

  fn close(&self) {
    TelemetryPublisher::close(self)
  }
}

impl Drop for TelemetryPublisher {
  fn drop(&mut self) {
    self.close();
  }
}

async fn accept_loop(listener: TcpListener, sender: broadcast::Sender<Message>) {
  loop {
    match listener.accept().await {
      Ok((stream, peer)) => {
        if let Err(e) = stream.set_nodelay(true) {
          warn!("订阅者 {} 设置 TCP_NODELAY 失败: {}", peer, e);
        }
        info!("新的遥测订阅者: {}", peer);
        tokio::spawn(write_loop(stream, peer, sender.subscribe()));
      }
      Err(e) => {
        warn!("接受订阅连接失败: {}", e);
        tokio::time::sleep(ACCEPT_RETRY_INTERVAL).await;
      }
    }
  }
}

async fn write_loop(
  mut stream: tokio::net::TcpStream,
  peer: SocketAddr,
  mut receiver: broadcast::Receiver<Message>,
) {
  loop {
    let message = match receiver.recv().await {
      Ok(message) => message,
      Err(RecvError::Lagged(skipped)) => {
        debug!("订阅者 {} 消费过慢，丢弃 {} 条旧消息", peer, skipped);
        continue;
      }
      Err(RecvError::Closed) => break,
    };

    let length = (message.len() as u32).to_be_bytes();
    let result = match stream.write_all(&length).await {
      Ok(()) => stream.write_all(&message).await,
      Err(e) => Err(e),
    };
    if let Err(e) = result {
      warn!("向订阅者 {} 发送失败: {}", peer, e);
      break;
    }
  }
  let _ = stream.shutdown().await;
  debug!("订阅者 {} 已断开", peer);
}

/// 遥测订阅端，转发桥接或测试使用
pub struct TelemetrySubscriber {
  stream: TcpStream,
}

impl TelemetrySubscriber {
  pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, TelemetryError> {
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    Ok(Self { stream })
  }

  pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), TelemetryError> {
    self.stream.set_read_timeout(timeout)?;
    Ok(())
  }

  pub fn recv_bytes(&mut self) -> Result<Vec<u8>, TelemetryError> {
    let mut length = [0u8; 4];
    self.stream.read_exact(&mut length)?;
    let length = u32::from_be_bytes(length) as usize;
    if length > MAX_MESSAGE_SIZE {
      return Err(TelemetryError::MalformedMessage(format!(
        "消息过大: {} 字节",
        length
      )));
    }

    let mut message = vec![0u8; length];
    self.stream.read_exact(&mut message)?;
    Ok(message)
  }

  pub fn recv(&mut self) -> Result<TelemetryMessage, TelemetryError> {
    decode_message(&self.recv_bytes()?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::light::LightState;

  fn snapshot() -> StatsSnapshot {
    StatsSnapshot {
      frame_count: 7,
      light_status: LightState::Red,
      total_vehicles_seen: 3,
      red_light_runner_count: 1,
      run_rate: 33.33,
      detection_count: 2,
    }
  }

  #[test]
  fn message_framing_splits_at_first_delimiter() {
    let metadata = TelemetryMetadata::from(&snapshot());
    let image = b"\xff\xd8:::\xff\xd9".to_vec();
    let message = encode_message(&metadata, &image).unwrap();

    let text = String::from_utf8_lossy(&message);
    assert!(text.starts_with("{\"frame_count\":7,\"light_status\":\"Red Light\""));

    let decoded = decode_message(&message).unwrap();
    assert_eq!(decoded.metadata, metadata);
    assert_eq!(decoded.image, image);

    assert!(matches!(
      decode_message(b"no delimiter"),
      Err(TelemetryError::MalformedMessage(_))
    ));
  }

  #[test]
  fn jpeg_encoding_produces_jpeg_magic() {
    let frame = RgbImage::from_pixel(32, 24, image::Rgb([200, 10, 10]));
    let jpeg = encode_jpeg(&frame, DEFAULT_JPEG_QUALITY).unwrap();
    assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
  }

  #[test]
  fn publish_without_subscribers_does_not_block() {
    let publisher = TelemetryPublisher::bind("127.0.0.1:0").unwrap();
    let frame = RgbImage::new(16, 16);
    for _ in 0..10 {
      publisher.publish(&frame, &snapshot()).unwrap();
    }
    assert_eq!(publisher.subscriber_count(), 0);
    publisher.close();
    publisher.close();
    assert!(publisher.is_closed());
    publisher.publish(&frame, &snapshot()).unwrap();
  }

  #[test]
  fn from_url_checks_scheme() {
    let url = Url::parse("udp://127.0.0.1:5555").unwrap();
    assert!(matches!(
      TelemetryPublisher::from_url(&url),
      Err(TelemetryError::SchemeMismatch)
    ));

    let url = Url::parse("tcp://127.0.0.1:0?quality=70").unwrap();
    let publisher = TelemetryPublisher::from_url(&url).unwrap();
    assert_eq!(publisher.quality, 70);
  }
}
