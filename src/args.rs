// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use hongdeng::{
  session::DEFAULT_ZONE_RELOAD_INTERVAL,
  violation::{CreditPolicy, DEFAULT_EVIDENCE_CAP},
};

/// Hongdeng 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，例如 replay:///data/frames.jsonl
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 区域配置目录，内含 red_zone.json 等文件
  #[arg(long, value_name = "DIR", default_value = ".")]
  pub zones: PathBuf,

  /// 遥测发布地址，例如 tcp://0.0.0.0:5555
  #[arg(long, value_name = "TELEMETRY")]
  pub telemetry: Option<Url>,

  /// 证据图像目录，例如 folder:///var/lib/hongdeng/red_light_runners
  #[arg(long, value_name = "EVIDENCE")]
  pub evidence: Option<Url>,

  /// 车辆记录文件，例如 record:///var/lib/hongdeng/traffic.jsonl
  #[arg(long, value_name = "RECORD")]
  pub record: Option<Url>,

  /// 闯红灯计数策略: immediate 或 trigger-gated
  #[arg(long, value_name = "POLICY", default_value_t = CreditPolicy::Immediate)]
  pub policy: CreditPolicy,

  /// 最大处理帧数，0 表示不限制
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,

  /// 区域配置重新加载间隔（帧），0 表示不重新加载
  #[arg(long, value_name = "FRAMES", default_value_t = DEFAULT_ZONE_RELOAD_INTERVAL)]
  pub reload_interval: u64,

  /// 证据图像数量上限
  #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_EVIDENCE_CAP)]
  pub evidence_cap: usize,
}
