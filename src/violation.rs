// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/violation.rs - 闯红灯判定
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

//! 每条轨迹的状态机：`Unseen -> Counted -> CountedRunner`。
//!
//! 轨迹中心第一次进入红区时计入总数；计数之后在红灯期间仍处于红区则记为闯红灯，
//! `CountedRunner` 为终态，同一辆车再次进入红区也不会重复计数。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
  light::{LightState, LightStateEstimator},
  tracker::{ObjectTracker, Track, TrackId},
  zone::{Polygon, is_inside},
};

pub const DEFAULT_EVIDENCE_CAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
  Unseen,
  Counted,
  CountedRunner,
}

impl VehicleState {
  pub fn of(track: &Track) -> Self {
    match (track.counted_in_total(), track.counted_as_runner()) {
      (_, true) => VehicleState::CountedRunner,
      (true, false) => VehicleState::Counted,
      (false, false) => VehicleState::Unseen,
    }
  }
}

/// 闯红灯记入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreditPolicy {
  /// 红灯期间处于红区即记为闯红灯
  #[default]
  Immediate,
  /// 只有平滑检测数跌破基线（触发条件置位）时才增加闯红灯计数
  TriggerGated,
}

impl fmt::Display for CreditPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CreditPolicy::Immediate => f.write_str("immediate"),
      CreditPolicy::TriggerGated => f.write_str("trigger-gated"),
    }
  }
}

impl FromStr for CreditPolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "immediate" => Ok(CreditPolicy::Immediate),
      "trigger-gated" | "trigger_gated" | "gated" => Ok(CreditPolicy::TriggerGated),
      other => Err(format!(
        "未知的记入方式 '{}'，可选: immediate, trigger-gated",
        other
      )),
    }
  }
}

/// 每帧统计快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
  pub frame_count: u64,
  pub light_status: LightState,
  pub total_vehicles_seen: u64,
  pub red_light_runner_count: u64,
  pub run_rate: f64,
  pub detection_count: usize,
}

/// 百分比，保留两位小数；总数为 0 时为 0
pub fn run_rate(runners: u64, total: u64) -> f64 {
  if total == 0 {
    return 0.0;
  }
  (runners as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
}

/// 写入持久化的单条车辆记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
  pub timestamp: DateTime<Utc>,
  pub vehicle_count: u32,
  pub is_runner: bool,
}

impl VehicleRecord {
  pub fn now(is_runner: bool) -> Self {
    Self {
      timestamp: Utc::now(),
      vehicle_count: 1,
      is_runner,
    }
  }
}

/// 请求保存违章证据图像
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceRequest {
  pub track_id: TrackId,
  pub frame_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
  pub snapshot: StatsSnapshot,
  pub records: Vec<VehicleRecord>,
  pub evidence: Vec<EvidenceRequest>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationCounters {
  pub total_vehicles_seen: u64,
  pub red_light_runner_count: u64,
  pub saved_evidence: usize,
}

#[derive(Debug, Clone)]
pub struct ViolationEngine {
  policy: CreditPolicy,
  evidence_cap: usize,
  counters: ViolationCounters,
  cap_reported: bool,
}

impl Default for ViolationEngine {
  fn default() -> Self {
    Self::new(CreditPolicy::default(), DEFAULT_EVIDENCE_CAP)
  }
}

impl ViolationEngine {
  pub fn new(policy: CreditPolicy, evidence_cap: usize) -> Self {
    Self {
      policy,
      evidence_cap,
      counters: ViolationCounters::default(),
      cap_reported: false,
    }
  }

  pub fn policy(&self) -> CreditPolicy {
    self.policy
  }

  pub fn counters(&self) -> ViolationCounters {
    self.counters
  }

  pub fn snapshot(&self, frame_count: u64, light: LightState, detection_count: usize) -> StatsSnapshot {
    StatsSnapshot {
      frame_count,
      light_status: light,
      total_vehicles_seen: self.counters.total_vehicles_seen,
      red_light_runner_count: self.counters.red_light_runner_count,
      run_rate: run_rate(
        self.counters.red_light_runner_count,
        self.counters.total_vehicles_seen,
      ),
      detection_count,
    }
  }

  /// 对当前所有活动轨迹执行一轮判定
  pub fn evaluate(
    &mut self,
    frame_count: u64,
    tracker: &mut ObjectTracker,
    red_zone: &Polygon,
    estimator: &mut LightStateEstimator,
    light: LightState,
    detection_count: usize,
  ) -> FrameOutcome {
    let mut records = Vec::new();
    let mut evidence = Vec::new();

    for (id, track) in tracker.active_tracks_mut().iter_mut() {
      if !is_inside(red_zone, track.center) {
        continue;
      }

      if VehicleState::of(track) == VehicleState::Unseen {
        track.mark_counted();
        self.counters.total_vehicles_seen += 1;
        records.push(VehicleRecord::now(light.is_red()));
        debug!("帧 {} 车辆 {} 计入总数 ({})", frame_count, id, light);
      }

      if light.is_red() && VehicleState::of(track) == VehicleState::Counted {
        self.credit_runner(frame_count, *id, estimator);
        track.mark_runner();

        if let Some(request) = self.request_evidence(frame_count, track) {
          evidence.push(request);
        }
      }
    }

    FrameOutcome {
      snapshot: self.snapshot(frame_count, light, detection_count),
      records,
      evidence,
    }
  }

  fn credit_runner(&mut self, frame_count: u64, id: TrackId, estimator: &mut LightStateEstimator) {
    match self.policy {
      CreditPolicy::Immediate => {
        self.counters.red_light_runner_count += 1;
        info!("帧 {} 车辆 {} 闯红灯", frame_count, id);
      }
      CreditPolicy::TriggerGated if estimator.trigger_armed() => {
        self.counters.red_light_runner_count += 1;
        estimator.credit_violation();
        info!("帧 {} 车辆 {} 闯红灯 (触发条件成立)", frame_count, id);
      }
      CreditPolicy::TriggerGated => {
        debug!("帧 {} 车辆 {} 红灯时在红区，但触发条件未成立", frame_count, id);
      }
    }
  }

  fn request_evidence(&mut self, frame_count: u64, track: &mut Track) -> Option<EvidenceRequest> {
    if track.evidence_saved() {
      return None;
    }

    if self.counters.saved_evidence >= self.evidence_cap {
      if !self.cap_reported {
        info!("证据图像已达上限 {}，不再保存", self.evidence_cap);
        self.cap_reported = true;
      } else {
        debug!("证据图像已达上限，忽略车辆 {}", track.id);
      }
      return None;
    }

    track.mark_evidence_saved();
    self.counters.saved_evidence += 1;
    Some(EvidenceRequest {
      track_id: track.id,
      frame_count,
    })
  }
}
