// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/output.rs - 输出定义
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

use image::RgbImage;
use thiserror::Error;

use crate::violation::StatsSnapshot;

/// 每帧统计与图像的发布端
pub trait Publish {
  type Error;
  fn publish(&self, frame: &RgbImage, snapshot: &StatsSnapshot) -> Result<(), Self::Error>;
  /// 可重复调用
  fn close(&self);
}

mod telemetry;
pub use self::telemetry::{
  DEFAULT_JPEG_QUALITY, DEFAULT_QUEUE_DEPTH, DEFAULT_TELEMETRY_PORT, MESSAGE_DELIMITER,
  TelemetryError, TelemetryMessage, TelemetryMetadata, TelemetryPublisher, TelemetrySubscriber,
  decode_message, encode_jpeg, encode_message,
};

mod evidence;
pub use self::evidence::{DEFAULT_EVIDENCE_DIR, EvidenceError, EvidenceStore};

mod record;
#[cfg(feature = "file_record")]
pub use self::record::FileRecorder;
pub use self::record::{
  BackgroundRecorder, HourlyBucket, MemoryRecorder, RecordError, TrafficSummary, VehicleRecorder,
  summarize_by_hour,
};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("遥测发布错误: {0}")]
  TelemetryError(#[from] TelemetryError),
  #[error("证据保存错误: {0}")]
  EvidenceError(#[from] EvidenceError),
  #[error("车辆记录错误: {0}")]
  RecordError(#[from] RecordError),
}
