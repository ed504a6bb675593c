// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/output/record.rs - 车辆记录持久化
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

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::violation::{VehicleRecord, run_rate};

#[cfg(feature = "file_record")]
mod file_recorder;
#[cfg(feature = "file_record")]
pub use self::file_recorder::FileRecorder;

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("后台记录线程已退出")]
  WorkerGone,
}

pub trait VehicleRecorder {
  fn record_vehicle(&mut self, record: &VehicleRecord) -> Result<(), RecordError>;
}

impl<R: VehicleRecorder + ?Sized> VehicleRecorder for Box<R> {
  fn record_vehicle(&mut self, record: &VehicleRecord) -> Result<(), RecordError> {
    (**self).record_vehicle(record)
  }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryRecorder {
  records: Vec<VehicleRecord>,
}

impl MemoryRecorder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn records(&self) -> &[VehicleRecord] {
    &self.records
  }
}

impl VehicleRecorder for MemoryRecorder {
  fn record_vehicle(&mut self, record: &VehicleRecord) -> Result<(), RecordError> {
    self.records.push(record.clone());
    Ok(())
  }
}

/// 在后台线程中执行阻塞写入，帧处理只负责投递
pub struct BackgroundRecorder<R> {
  sender: Option<Sender<VehicleRecord>>,
  worker: Option<JoinHandle<R>>,
}

impl<R: VehicleRecorder + Send + 'static> BackgroundRecorder<R> {
  pub fn spawn(mut recorder: R) -> Result<Self, RecordError> {
    let (sender, receiver) = mpsc::channel::<VehicleRecord>();
    let worker = thread::Builder::new()
      .name("vehicle-recorder".to_string())
      .spawn(move || {
        for record in receiver {
          if let Err(e) = recorder.record_vehicle(&record) {
            error!("写入车辆记录失败: {}", e);
          }
        }
        recorder
      })?;

    Ok(Self {
      sender: Some(sender),
      worker: Some(worker),
    })
  }

  /// 关闭通道，等待剩余记录写完后取回内部记录器
  pub fn into_inner(mut self) -> Result<R, RecordError> {
    self.sender.take();
    self
      .worker
      .take()
      .ok_or(RecordError::WorkerGone)?
      .join()
      .map_err(|_| RecordError::WorkerGone)
  }
}

impl<R> VehicleRecorder for BackgroundRecorder<R> {
  fn record_vehicle(&mut self, record: &VehicleRecord) -> Result<(), RecordError> {
    self
      .sender
      .as_ref()
      .ok_or(RecordError::WorkerGone)?
      .send(record.clone())
      .map_err(|_| RecordError::WorkerGone)
  }
}

impl<R> Drop for BackgroundRecorder<R> {
  fn drop(&mut self) {
    self.sender.take();
    if let Some(worker) = self.worker.take()
      && worker.join().is_err()
    {
      warn!("后台记录线程异常退出");
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyBucket {
  pub hour: String,
  pub total_vehicles: u64,
  pub red_light_runners: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSummary {
  pub hourly: Vec<HourlyBucket>,
  pub total_vehicles: u64,
  pub red_light_runners: u64,
  pub run_rate: f64,
}

/// 按小时汇总车辆记录
pub fn summarize_by_hour(records: &[VehicleRecord]) -> TrafficSummary {
  let mut buckets: BTreeMap<String, (u64, u64)> = BTreeMap::new();
  for record in records {
    let hour = record.timestamp.format("%Y-%m-%d %H:00").to_string();
    let bucket = buckets.entry(hour).or_default();
    bucket.0 += record.vehicle_count as u64;
    if record.is_runner {
      bucket.1 += record.vehicle_count as u64;
    }
  }

  let hourly: Vec<HourlyBucket> = buckets
    .into_iter()
    .map(|(hour, (total, runners))| HourlyBucket {
      hour,
      total_vehicles: total,
      red_light_runners: runners,
    })
    .collect();

  let total_vehicles = hourly.iter().map(|b| b.total_vehicles).sum();
  let red_light_runners = hourly.iter().map(|b| b.red_light_runners).sum();

  TrafficSummary {
    hourly,
    total_vehicles,
    red_light_runners,
    run_rate: run_rate(red_light_runners, total_vehicles),
  }
}
