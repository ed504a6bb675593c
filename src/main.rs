// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use hongdeng::{
  FromUrl,
  input::InputWrapper,
  light::ActivitySignal,
  session::{Session, SessionConfig, Sinks},
  task::{ContinuousTask, Task},
  zone::{FileZoneProvider, ZoneRegistry},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入来源: {}", args.input);
  info!("区域目录: {}", args.zones.display());
  info!("计数策略: {}", args.policy);
  if let Some(telemetry) = &args.telemetry {
    info!("遥测发布: {}", telemetry);
  }

  let mut zones = ZoneRegistry::with_defaults(Box::new(FileZoneProvider::new(&args.zones)))?;
  let report = zones.reload();
  info!("初始区域加载: 更新 {:?}, 使用默认值 {:?}", report.updated, report.retained);

  let activity = ActivitySignal::new();
  let input = InputWrapper::from_url(&args.input)?.with_activity_signal(activity.clone());
  let sinks = Sinks::from_urls(
    args.telemetry.as_ref(),
    args.evidence.as_ref(),
    args.record.as_ref(),
  )?;

  let config = SessionConfig {
    credit_policy: args.policy,
    evidence_cap: args.evidence_cap,
    zone_reload_interval: args.reload_interval,
    ..SessionConfig::default()
  };
  let mut session = Session::new(config, zones, activity, sinks);

  let frame_number = (args.frame_number > 0).then_some(args.frame_number);
  ContinuousTask::default()
    .with_frame_number(frame_number)
    .with_interrupt_handler()
    .run_task(input, &mut session)?;

  Ok(())
}
