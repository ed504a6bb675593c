// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/light.rs - 信号灯状态推断
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

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightState {
  #[serde(rename = "Green Light")]
  Green,
  #[serde(rename = "Red Light")]
  Red,
}

impl LightState {
  pub fn as_str(&self) -> &'static str {
    match self {
      LightState::Green => "Green Light",
      LightState::Red => "Red Light",
    }
  }

  pub fn is_red(&self) -> bool {
    matches!(self, LightState::Red)
  }
}

impl fmt::Display for LightState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 外部检测进程写入的活动量（红色像素计数等）。
///
/// 核心每帧只做一次原子读取。
#[derive(Debug, Clone, Default)]
pub struct ActivitySignal(Arc<AtomicI64>);

impl ActivitySignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn store(&self, value: i64) {
    self.0.store(value, Ordering::Release);
  }

  pub fn load(&self) -> i64 {
    self.0.load(Ordering::Acquire)
  }
}

/// 平滑检测数量 + 绿灯期间最大值基线。
///
/// 红灯期间平滑值跌破基线时触发条件被置位，近似表示“有车离开了观测区域”。
#[derive(Debug, Clone)]
pub struct LightStateEstimator {
  window: VecDeque<usize>,
  capacity: usize,
  smoothed: f64,
  baseline: f64,
  trigger_armed: bool,
  last_state: Option<LightState>,
}

impl Default for LightStateEstimator {
  fn default() -> Self {
    Self::new(DEFAULT_SMOOTHING_WINDOW)
  }
}

impl LightStateEstimator {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      window: VecDeque::with_capacity(capacity),
      capacity,
      smoothed: 0.0,
      baseline: 0.0,
      trigger_armed: false,
      last_state: None,
    }
  }

  /// 记录本帧检测数量，返回平滑后的数量
  pub fn observe(&mut self, detection_count: usize) -> f64 {
    if self.window.len() >= self.capacity {
      self.window.pop_front();
    }
    self.window.push_back(detection_count);

    self.smoothed = self.window.iter().sum::<usize>() as f64 / self.window.len() as f64;
    self.baseline = self.baseline.max(self.smoothed);
    if self.smoothed < self.baseline && !self.trigger_armed {
      debug!("平滑检测数 {:.2} 低于基线 {:.2}，触发条件置位", self.smoothed, self.baseline);
      self.trigger_armed = true;
    }
    self.smoothed
  }

  /// 活动量为 0 时为绿灯，否则为红灯；绿灯会把基线清零
  pub fn light_status(&mut self, activity: i64) -> LightState {
    let state = if activity == 0 {
      LightState::Green
    } else {
      LightState::Red
    };

    if state == LightState::Green {
      self.baseline = 0.0;
      self.trigger_armed = false;
    }

    if self.last_state != Some(state) {
      info!("信号灯状态变为: {}", state);
      self.last_state = Some(state);
    }
    state
  }

  /// 触发条件成立并完成一次违章记录后，用当前平滑值更新基线
  pub fn credit_violation(&mut self) {
    self.baseline = self.smoothed;
    self.trigger_armed = false;
  }

  pub fn trigger_armed(&self) -> bool {
    self.trigger_armed
  }

  pub fn smoothed(&self) -> f64 {
    self.smoothed
  }

  pub fn baseline(&self) -> f64 {
    self.baseline
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn smoothing_window_evicts_oldest() {
    let mut estimator = LightStateEstimator::new(3);
    assert_eq!(estimator.observe(3), 3.0);
    assert_eq!(estimator.observe(0), 1.5);
    assert_eq!(estimator.observe(3), 2.0);
    // 3 被挤出
    assert_eq!(estimator.observe(0), 1.0);
  }

  #[test]
  fn activity_flips_light_and_green_resets_baseline() {
    let mut estimator = LightStateEstimator::default();
    estimator.observe(4);
    assert_eq!(estimator.light_status(0), LightState::Green);
    assert_eq!(estimator.baseline(), 0.0);

    estimator.observe(4);
    assert_eq!(estimator.light_status(1), LightState::Red);
    assert_eq!(estimator.baseline(), 4.0);

    assert_eq!(estimator.light_status(0), LightState::Green);
    assert_eq!(estimator.baseline(), 0.0);
    assert!(!estimator.trigger_armed());
  }

  #[test]
  fn dropping_count_arms_trigger_while_red() {
    let mut estimator = LightStateEstimator::new(2);
    estimator.observe(2);
    estimator.observe(2);
    estimator.light_status(5);
    assert!(!estimator.trigger_armed());

    estimator.observe(0);
    assert!(estimator.trigger_armed());
    assert_eq!(estimator.smoothed(), 1.0);

    estimator.credit_violation();
    assert!(!estimator.trigger_armed());
    assert_eq!(estimator.baseline(), 1.0);
  }

  #[test]
  fn activity_signal_is_shared() {
    let signal = ActivitySignal::new();
    let writer = signal.clone();
    let handle = std::thread::spawn(move || writer.store(42));
    handle.join().unwrap();
    assert_eq!(signal.load(), 42);
  }

  #[test]
  fn light_state_strings() {
    assert_eq!(LightState::Red.to_string(), "Red Light");
    assert_eq!(
      serde_json::to_string(&LightState::Green).unwrap(),
      "\"Green Light\""
    );
  }
}
