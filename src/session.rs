// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/session.rs - 单路视频的分析会话
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

//! 会话持有跟踪器、区域、信号灯估计与判定引擎，
//! 每帧按固定顺序推进并把副作用交给输出端。
//! 多线程宿主需要用一把锁包住整个会话。

use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  detection::Detection,
  frame::Frame,
  light::{ActivitySignal, DEFAULT_SMOOTHING_WINDOW, LightStateEstimator},
  output::{
    EvidenceStore, OutputError, Publish, TelemetryError, TelemetryPublisher, VehicleRecorder,
  },
  tracker::{ObjectTracker, TrackerConfig},
  violation::{CreditPolicy, DEFAULT_EVIDENCE_CAP, StatsSnapshot, ViolationCounters, ViolationEngine},
  zone::{GREEN_ZONE, Polygon, RED_ZONE, ZoneError, ZoneRegistry, is_inside},
};

pub const DEFAULT_ZONE_RELOAD_INTERVAL: u64 = 500;

#[derive(Debug, Clone)]
pub struct SessionConfig {
  pub tracker: TrackerConfig,
  pub estimator_window: usize,
  pub credit_policy: CreditPolicy,
  pub evidence_cap: usize,
  /// 0 表示不重新加载
  pub zone_reload_interval: u64,
  pub red_zone: String,
  pub green_zone: String,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      tracker: TrackerConfig::default(),
      estimator_window: DEFAULT_SMOOTHING_WINDOW,
      credit_policy: CreditPolicy::default(),
      evidence_cap: DEFAULT_EVIDENCE_CAP,
      zone_reload_interval: DEFAULT_ZONE_RELOAD_INTERVAL,
      red_zone: RED_ZONE.to_string(),
      green_zone: GREEN_ZONE.to_string(),
    }
  }
}

pub type BoxedPublisher = Box<dyn Publish<Error = TelemetryError> + Send>;
pub type BoxedRecorder = Box<dyn VehicleRecorder + Send>;

/// 会话的外部输出，均可缺省
#[derive(Default)]
pub struct Sinks {
  pub publisher: Option<BoxedPublisher>,
  pub evidence: Option<EvidenceStore>,
  pub recorder: Option<BoxedRecorder>,
}

impl Sinks {
  pub fn with_publisher(mut self, publisher: impl Publish<Error = TelemetryError> + Send + 'static) -> Self {
    self.publisher = Some(Box::new(publisher));
    self
  }

  pub fn with_evidence(mut self, evidence: EvidenceStore) -> Self {
    self.evidence = Some(evidence);
    self
  }

  pub fn with_recorder(mut self, recorder: impl VehicleRecorder + Send + 'static) -> Self {
    self.recorder = Some(Box::new(recorder));
    self
  }

  /// 按 URL 创建输出端，未给出的输出端保持为空
  pub fn from_urls(
    telemetry: Option<&Url>,
    evidence: Option<&Url>,
    record: Option<&Url>,
  ) -> Result<Self, OutputError> {
    let mut sinks = Sinks::default();

    if let Some(url) = telemetry {
      sinks = sinks.with_publisher(TelemetryPublisher::from_url(url)?);
    }
    if let Some(url) = evidence {
      sinks = sinks.with_evidence(EvidenceStore::from_url(url)?);
    }
    if let Some(url) = record {
      sinks.recorder = Some(Self::recorder_from_url(url)?);
    }

    Ok(sinks)
  }

  #[cfg(feature = "file_record")]
  fn recorder_from_url(url: &Url) -> Result<BoxedRecorder, OutputError> {
    use crate::output::{BackgroundRecorder, FileRecorder};

    let recorder = BackgroundRecorder::spawn(FileRecorder::from_url(url)?)?;
    Ok(Box::new(recorder))
  }

  #[cfg(not(feature = "file_record"))]
  fn recorder_from_url(url: &Url) -> Result<BoxedRecorder, OutputError> {
    warn!("未启用 file_record 功能，无法创建记录输出: {}", url);
    Err(crate::output::RecordError::SchemeMismatch.into())
  }
}

pub struct Session {
  config: SessionConfig,
  zones: ZoneRegistry,
  tracker: ObjectTracker,
  estimator: LightStateEstimator,
  engine: ViolationEngine,
  activity: ActivitySignal,
  sinks: Sinks,
  frame_count: u64,
  last_snapshot: Option<StatsSnapshot>,
}

impl Session {
  pub fn new(config: SessionConfig, zones: ZoneRegistry, activity: ActivitySignal, sinks: Sinks) -> Self {
    info!(
      "创建分析会话: 计数策略 {}, 证据上限 {}, 区域刷新间隔 {} 帧",
      config.credit_policy, config.evidence_cap, config.zone_reload_interval
    );
    Self {
      tracker: ObjectTracker::new(config.tracker),
      estimator: LightStateEstimator::new(config.estimator_window),
      engine: ViolationEngine::new(config.credit_policy, config.evidence_cap),
      config,
      zones,
      activity,
      sinks,
      frame_count: 0,
      last_snapshot: None,
    }
  }

  pub fn config(&self) -> &SessionConfig {
    &self.config
  }

  pub fn frame_count(&self) -> u64 {
    self.frame_count
  }

  pub fn counters(&self) -> ViolationCounters {
    self.engine.counters()
  }

  pub fn last_snapshot(&self) -> Option<&StatsSnapshot> {
    self.last_snapshot.as_ref()
  }

  pub fn zones(&self) -> &ZoneRegistry {
    &self.zones
  }

  pub fn tracker(&self) -> &ObjectTracker {
    &self.tracker
  }

  pub fn estimator(&self) -> &LightStateEstimator {
    &self.estimator
  }

  pub fn activity(&self) -> &ActivitySignal {
    &self.activity
  }

  /// 处理一帧检测结果并返回本帧统计
  pub fn process_frame(&mut self, frame: &Frame) -> Result<StatsSnapshot, ZoneError> {
    self.frame_count += 1;
    let frame_count = self.frame_count;

    let interval = self.config.zone_reload_interval;
    if interval > 0 && frame_count % interval == 0 {
      let report = self.zones.reload();
      debug!(
        "帧 {} 刷新区域: 更新 {:?}, 保留 {:?}",
        frame_count, report.updated, report.retained
      );
    }

    let red = self.zones.get(&self.config.red_zone)?;
    let green = self.zones.get(&self.config.green_zone)?;

    let relevant = relevant_vehicles(&frame.detections, red, green, frame.width(), frame.height());
    let smoothed = self.estimator.observe(relevant.len());
    self
      .tracker
      .update(frame_count, &relevant, frame.width(), frame.height());

    let light = self.estimator.light_status(self.activity.load());
    let outcome = self.engine.evaluate(
      frame_count,
      &mut self.tracker,
      red,
      &mut self.estimator,
      light,
      relevant.len(),
    );
    debug!(
      "帧 {}: {} 辆相关车辆, 平滑值 {:.2}, {}",
      frame_count,
      relevant.len(),
      smoothed,
      light
    );

    if let Some(recorder) = self.sinks.recorder.as_mut() {
      for record in &outcome.records {
        if let Err(e) = recorder.record_vehicle(record) {
          error!("帧 {} 写入车辆记录失败: {}", frame_count, e);
        }
      }
    }

    if let Some(store) = self.sinks.evidence.as_ref() {
      for request in &outcome.evidence {
        if let Err(e) = store.save(&frame.image, request) {
          error!("帧 {} 保存车辆 {} 证据失败: {}", frame_count, request.track_id, e);
        }
      }
    }

    if let Some(publisher) = self.sinks.publisher.as_ref()
      && let Err(e) = publisher.publish(&frame.image, &outcome.snapshot)
    {
      warn!("帧 {} 发布遥测失败: {}", frame_count, e);
    }

    self.last_snapshot = Some(outcome.snapshot);
    Ok(outcome.snapshot)
  }

  /// 关闭发布端并释放输出端，可重复调用
  pub fn close(&mut self) {
    if let Some(publisher) = self.sinks.publisher.take() {
      publisher.close();
      info!("遥测发布已关闭");
    }
    if self.sinks.recorder.take().is_some() {
      info!("车辆记录已关闭");
    }
    self.sinks.evidence = None;
  }
}

impl Drop for Session {
  fn drop(&mut self) {
    self.close();
  }
}

/// 中心点落在红区或绿区内的车辆检测
fn relevant_vehicles(
  detections: &[Detection],
  red: &Polygon,
  green: &Polygon,
  width: u32,
  height: u32,
) -> Vec<Detection> {
  detections
    .iter()
    .filter(|det| det.is_vehicle())
    .filter(|det| match det.denormalize(width, height) {
      Ok(candidate) => is_inside(red, candidate.center) || is_inside(green, candidate.center),
      Err(_) => false,
    })
    .cloned()
    .collect()
}
