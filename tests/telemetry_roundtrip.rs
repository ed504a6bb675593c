// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// tests/telemetry_roundtrip.rs - 遥测发布端到端测试
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

use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;

use hongdeng::{
  frame::Frame,
  light::{ActivitySignal, LightState},
  output::{
    DEFAULT_QUEUE_DEPTH, Publish, TelemetryMetadata, TelemetryPublisher, TelemetrySubscriber,
    decode_message, encode_message,
  },
  session::{Session, SessionConfig, Sinks},
  violation::StatsSnapshot,
  zone::{StaticZoneProvider, ZoneRegistry},
};

fn wait_for_subscribers(publisher: &TelemetryPublisher, n: usize) {
  let deadline = Instant::now() + Duration::from_secs(5);
  while publisher.subscriber_count() < n {
    assert!(Instant::now() < deadline, "订阅者未能及时注册");
    thread::sleep(Duration::from_millis(10));
  }
}

fn subscriber(publisher: &TelemetryPublisher) -> TelemetrySubscriber {
  let subscriber = TelemetrySubscriber::connect(publisher.local_addr()).unwrap();
  subscriber
    .set_read_timeout(Some(Duration::from_secs(5)))
    .unwrap();
  subscriber
}

#[test]
fn subscriber_receives_metadata_and_jpeg() {
  let publisher = TelemetryPublisher::bind("127.0.0.1:0").unwrap();
  let mut subscriber = subscriber(&publisher);
  wait_for_subscribers(&publisher, 1);

  let snapshot = StatsSnapshot {
    frame_count: 12,
    light_status: LightState::Red,
    total_vehicles_seen: 4,
    red_light_runner_count: 1,
    run_rate: 25.0,
    detection_count: 2,
  };
  let image = RgbImage::from_pixel(32, 24, image::Rgb([10, 200, 30]));
  publisher.publish(&image, &snapshot).unwrap();

  let message = subscriber.recv().unwrap();
  assert_eq!(message.metadata.frame_count, 12);
  assert_eq!(message.metadata.light_status, "Red Light");
  assert_eq!(message.metadata.total_vehicles, 4);
  assert_eq!(message.metadata.red_light_runners, 1);
  assert_eq!(message.metadata.run_rate, 25.0);
  assert_eq!(&message.image[..2], &[0xFF, 0xD8]);

  let decoded = image::load_from_memory(&message.image).unwrap();
  assert_eq!((decoded.width(), decoded.height()), (32, 24));

  publisher.close();
}

#[test]
fn every_subscriber_gets_each_frame_in_order() {
  let publisher = TelemetryPublisher::bind("127.0.0.1:0").unwrap();
  let mut first = subscriber(&publisher);
  let mut second = subscriber(&publisher);
  wait_for_subscribers(&publisher, 2);

  let zones = ZoneRegistry::with_defaults(Box::new(StaticZoneProvider::new())).unwrap();
  let mut session = Session::new(
    SessionConfig::default(),
    zones,
    ActivitySignal::new(),
    Sinks::default().with_publisher(publisher),
  );

  // 每帧都等订阅者读完再发下一帧，避免被丢弃
  for expected in 1..=3u64 {
    session
      .process_frame(&Frame::blank(0, 16, 16, Vec::new()))
      .unwrap();
    assert_eq!(first.recv().unwrap().metadata.frame_count, expected);
    assert_eq!(second.recv().unwrap().metadata.frame_count, expected);
  }

  session.close();
}

#[test]
fn close_disconnects_subscribers() {
  let publisher = TelemetryPublisher::bind("127.0.0.1:0").unwrap();
  let mut subscriber = subscriber(&publisher);
  wait_for_subscribers(&publisher, 1);

  publisher.close();
  publisher.close();
  assert!(subscriber.recv_bytes().is_err());
}

#[test]
fn stalled_subscriber_keeps_only_newest_messages() {
  let publisher = TelemetryPublisher::bind("127.0.0.1:0").unwrap();
  let mut stalled = subscriber(&publisher);
  wait_for_subscribers(&publisher, 1);

  // 单条消息远大于回环套接字缓冲区，第一条写不完时写出任务会停住
  let payload = vec![0xAB; 24 * 1024 * 1024];
  for frame_count in 1..=5u64 {
    let metadata = TelemetryMetadata {
      frame_count,
      light_status: "Red Light".to_string(),
      total_vehicles: frame_count,
      red_light_runners: 0,
      run_rate: 0.0,
    };
    publisher.publish_bytes(encode_message(&metadata, &payload).unwrap());
  }

  stalled
    .set_read_timeout(Some(Duration::from_millis(1500)))
    .unwrap();
  let mut delivered = Vec::new();
  while let Ok(bytes) = stalled.recv_bytes() {
    let message = decode_message(&bytes).unwrap();
    assert_eq!(message.image.len(), payload.len());
    delivered.push(message.metadata.frame_count);
  }

  assert!(!delivered.is_empty());
  assert!(delivered.len() <= DEFAULT_QUEUE_DEPTH, "送达 {:?}", delivered);
  assert!(delivered.windows(2).all(|w| w[0] < w[1]));
  assert_eq!(delivered.last(), Some(&5));

  publisher.close();
}
