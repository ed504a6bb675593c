// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// tests/session_scenarios.rs - 会话级场景测试
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

use std::sync::{Arc, Mutex};

use hongdeng::{
  detection::Detection,
  frame::Frame,
  light::{ActivitySignal, LightState},
  output::{RecordError, VehicleRecorder},
  session::{Session, SessionConfig, Sinks},
  violation::{CreditPolicy, VehicleRecord},
  zone::{StaticZoneProvider, ZoneRegistry},
};

const SIZE: u32 = 1024;

fn car_at(x: i32, y: i32) -> Detection {
  let f = SIZE as f32;
  Detection::new(
    "car",
    [
      (x - 8) as f32 / f,
      (y - 8) as f32 / f,
      (x + 8) as f32 / f,
      (y + 8) as f32 / f,
    ],
    0.9,
  )
}

fn frame(detections: Vec<Detection>) -> Frame {
  Frame::blank(0, SIZE, SIZE, detections)
}

#[derive(Clone, Default)]
struct SharedRecorder(Arc<Mutex<Vec<VehicleRecord>>>);

impl VehicleRecorder for SharedRecorder {
  fn record_vehicle(&mut self, record: &VehicleRecord) -> Result<(), RecordError> {
    self.0.lock().unwrap().push(record.clone());
    Ok(())
  }
}

fn session_with(policy: CreditPolicy, sinks: Sinks) -> (Session, ActivitySignal) {
  let zones = ZoneRegistry::with_defaults(Box::new(StaticZoneProvider::new())).unwrap();
  let activity = ActivitySignal::new();
  let config = SessionConfig {
    credit_policy: policy,
    ..SessionConfig::default()
  };
  (Session::new(config, zones, activity.clone(), sinks), activity)
}

/// 线性同余发生器，保证测试可复现
struct Lcg(u64);

impl Lcg {
  fn next(&mut self) -> u64 {
    self.0 = self
      .0
      .wrapping_mul(6364136223846793005)
      .wrapping_add(1442695040888963407);
    self.0 >> 33
  }

  fn range(&mut self, lo: i32, hi: i32) -> i32 {
    lo + (self.next() % (hi - lo) as u64) as i32
  }
}

#[test]
fn stationary_car_in_red_zone_is_counted_once() {
  let recorder = SharedRecorder::default();
  let (mut session, activity) =
    session_with(CreditPolicy::Immediate, Sinks::default().with_recorder(recorder.clone()));
  activity.store(1);

  for _ in 0..20 {
    session.process_frame(&frame(vec![car_at(100, 400)])).unwrap();
  }

  let counters = session.counters();
  assert_eq!(counters.total_vehicles_seen, 1);
  assert_eq!(counters.red_light_runner_count, 1);
  assert_eq!(counters.saved_evidence, 1);
  assert_eq!(session.tracker().active_tracks().len(), 1);
  assert_eq!(recorder.0.lock().unwrap().len(), 1);
}

#[test]
fn car_counted_during_green_becomes_runner_when_light_turns_red() {
  let (mut session, activity) = session_with(CreditPolicy::Immediate, Sinks::default());

  for _ in 0..3 {
    let snapshot = session.process_frame(&frame(vec![car_at(100, 400)])).unwrap();
    assert_eq!(snapshot.light_status, LightState::Green);
  }
  assert_eq!(session.counters().total_vehicles_seen, 1);
  assert_eq!(session.counters().red_light_runner_count, 0);

  activity.store(500);
  let snapshot = session.process_frame(&frame(vec![car_at(100, 400)])).unwrap();
  assert_eq!(snapshot.light_status, LightState::Red);
  assert_eq!(snapshot.total_vehicles_seen, 1);
  assert_eq!(snapshot.red_light_runner_count, 1);
  assert_eq!(snapshot.run_rate, 100.0);
}

#[test]
fn light_flips_follow_activity_and_green_resets_baseline() {
  let (mut session, activity) = session_with(CreditPolicy::Immediate, Sinks::default());
  let cars = || vec![car_at(100, 400), car_at(300, 480)];

  let snapshot = session.process_frame(&frame(cars())).unwrap();
  assert_eq!(snapshot.light_status, LightState::Green);

  activity.store(1);
  let snapshot = session.process_frame(&frame(cars())).unwrap();
  assert_eq!(snapshot.light_status, LightState::Red);
  assert!(session.estimator().baseline() > 0.0);

  activity.store(0);
  let snapshot = session.process_frame(&frame(cars())).unwrap();
  assert_eq!(snapshot.light_status, LightState::Green);
  assert_eq!(session.estimator().baseline(), 0.0);
  assert!(!session.estimator().trigger_armed());
}

/// 红灯期间绿区车辆离开使平滑值跌破基线，之后驶入红区的车辆才被计入闯红灯
fn gated_sequence(policy: CreditPolicy) -> Session {
  let (mut session, activity) = session_with(policy, Sinks::default());
  let a = car_at(100, 400);
  let b = car_at(300, 480);
  let c = car_at(130, 415);

  for _ in 0..5 {
    session.process_frame(&frame(vec![a.clone(), b.clone()])).unwrap();
  }

  activity.store(1);
  session.process_frame(&frame(vec![a.clone(), b.clone()])).unwrap();
  session.process_frame(&frame(vec![a.clone()])).unwrap();
  assert!(session.estimator().trigger_armed());

  session.process_frame(&frame(vec![a, c])).unwrap();
  session
}

#[test]
fn trigger_gated_policy_credits_only_after_activity_drop() {
  let session = gated_sequence(CreditPolicy::TriggerGated);
  let counters = session.counters();
  assert_eq!(counters.total_vehicles_seen, 2);
  assert_eq!(counters.red_light_runner_count, 1);
  assert!(!session.estimator().trigger_armed());
}

#[test]
fn immediate_policy_credits_every_red_zone_vehicle() {
  let session = gated_sequence(CreditPolicy::Immediate);
  let counters = session.counters();
  assert_eq!(counters.total_vehicles_seen, 2);
  assert_eq!(counters.red_light_runner_count, 2);
}

#[test]
fn runners_never_exceed_total() {
  for seed in 1..6 {
    let mut rng = Lcg(seed);
    for policy in [CreditPolicy::Immediate, CreditPolicy::TriggerGated] {
      let (mut session, activity) = session_with(policy, Sinks::default());
      for _ in 0..300 {
        if rng.next() % 20 == 0 {
          activity.store((rng.next() % 2) as i64);
        }
        let count = rng.range(0, 5);
        let detections = (0..count)
          .map(|_| {
            if rng.next() % 2 == 0 {
              car_at(rng.range(85, 135), rng.range(392, 420))
            } else {
              car_at(rng.range(60, 600), rng.range(350, 600))
            }
          })
          .collect();

        let snapshot = session.process_frame(&frame(detections)).unwrap();
        assert!(snapshot.red_light_runner_count <= snapshot.total_vehicles_seen);
        if snapshot.total_vehicles_seen == 0 {
          assert_eq!(snapshot.run_rate, 0.0);
        } else {
          assert!((0.0..=100.0).contains(&snapshot.run_rate));
        }
      }
    }
  }
}

#[test]
fn evidence_cap_limits_saved_images() {
  let zones = ZoneRegistry::with_defaults(Box::new(StaticZoneProvider::new())).unwrap();
  let activity = ActivitySignal::new();
  let config = SessionConfig {
    evidence_cap: 2,
    ..SessionConfig::default()
  };
  let mut session = Session::new(config, zones, activity.clone(), Sinks::default());
  activity.store(1);

  // 每辆车停留一帧后离开，超过 30 帧后轨迹过期
  for _ in 0..4 {
    session.process_frame(&frame(vec![car_at(100, 400)])).unwrap();
    for _ in 0..31 {
      session.process_frame(&frame(Vec::new())).unwrap();
    }
  }

  let counters = session.counters();
  assert_eq!(counters.total_vehicles_seen, 4);
  assert_eq!(counters.red_light_runner_count, 4);
  assert_eq!(counters.saved_evidence, 2);
}
