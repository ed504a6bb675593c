// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/zone.rs - 监控区域管理
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

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::{info, warn};

use crate::detection::Point;

mod file_provider;
pub use self::file_provider::FileZoneProvider;

mod upload;
pub use self::upload::ZoneUpload;

pub const RED_ZONE: &str = "red_zone";
pub const GREEN_ZONE: &str = "green_zone";
pub const TRAFFIC_ZONE: &str = "traffic_zone";

pub const DEFAULT_RED_ZONE: [(i32, i32); 4] = [(80, 382), (160, 410), (138, 430), (80, 405)];
pub const DEFAULT_GREEN_ZONE: [(i32, i32); 4] = [(210, 420), (555, 530), (560, 590), (165, 425)];
pub const DEFAULT_TRAFFIC_ZONE: [(i32, i32); 4] = [(160, 370), (180, 370), (180, 340), (160, 340)];

const MIN_VERTICES: usize = 3;

#[derive(Error, Debug)]
pub enum ZoneError {
  #[error("未知区域: {0}")]
  UnknownZone(String),
  #[error("区域顶点不足: 需要至少 3 个, 实际 {0} 个")]
  TooFewVertices(usize),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("区域文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("区域上传无效: {0}")]
  InvalidUpload(String),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
  points: Vec<Point>,
}

impl Polygon {
  pub fn new(points: Vec<Point>) -> Result<Self, ZoneError> {
    if points.len() < MIN_VERTICES {
      return Err(ZoneError::TooFewVertices(points.len()));
    }
    Ok(Self { points })
  }

  /// 由 JSON 中的 `[x, y]` 坐标构造，浮点坐标向零截断
  pub fn from_pairs(pairs: &[[f64; 2]]) -> Result<Self, ZoneError> {
    Self::new(
      pairs
        .iter()
        .map(|[x, y]| Point::new(*x as i32, *y as i32))
        .collect(),
    )
  }

  pub fn points(&self) -> &[Point] {
    &self.points
  }

  pub fn to_pairs(&self) -> Vec<[i32; 2]> {
    self.points.iter().map(|p| [p.x, p.y]).collect()
  }
}

impl<const N: usize> TryFrom<[(i32, i32); N]> for Polygon {
  type Error = ZoneError;

  fn try_from(points: [(i32, i32); N]) -> Result<Self, Self::Error> {
    Polygon::new(points.into_iter().map(Point::from).collect())
  }
}

/// 点是否在多边形内，边界上的点视为在内
pub fn is_inside(polygon: &Polygon, point: Point) -> bool {
  let points = polygon.points();
  let (px, py) = (point.x as i64, point.y as i64);
  let mut inside = false;

  for (i, a) in points.iter().enumerate() {
    let b = points[(i + 1) % points.len()];
    let (ax, ay, bx, by) = (a.x as i64, a.y as i64, b.x as i64, b.y as i64);

    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    if cross == 0
      && (ax.min(bx)..=ax.max(bx)).contains(&px)
      && (ay.min(by)..=ay.max(by)).contains(&py)
    {
      return true;
    }

    if (ay > py) != (by > py) {
      let x_cross = ax as f64 + (py - ay) as f64 * (bx - ax) as f64 / (by - ay) as f64;
      if (px as f64) < x_cross {
        inside = !inside;
      }
    }
  }

  inside
}

/// 带版本号的配置值
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
  pub version: u64,
  pub value: T,
}

/// 区域配置来源
pub trait ZoneProvider {
  /// 读取指定区域的最新值，成功时同时更新 `last_good`
  fn load(&mut self, name: &str) -> Result<Polygon, ZoneError>;
  /// 最近一次成功读取的值
  fn last_good(&self, name: &str) -> Option<&Versioned<Polygon>>;
}

/// 内存中的区域来源，用于默认配置和测试
#[derive(Debug, Default)]
pub struct StaticZoneProvider {
  zones: HashMap<String, Versioned<Polygon>>,
  version: u64,
}

impl StaticZoneProvider {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&mut self, name: impl Into<String>, polygon: Polygon) {
    self.version += 1;
    self.zones.insert(
      name.into(),
      Versioned {
        version: self.version,
        value: polygon,
      },
    );
  }
}

impl ZoneProvider for StaticZoneProvider {
  fn load(&mut self, name: &str) -> Result<Polygon, ZoneError> {
    self
      .zones
      .get(name)
      .map(|v| v.value.clone())
      .ok_or_else(|| ZoneError::UnknownZone(name.to_string()))
  }

  fn last_good(&self, name: &str) -> Option<&Versioned<Polygon>> {
    self.zones.get(name)
  }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReloadReport {
  pub updated: Vec<String>,
  pub retained: Vec<String>,
}

pub struct ZoneRegistry {
  zones: BTreeMap<String, Polygon>,
  provider: Box<dyn ZoneProvider + Send>,
}

impl ZoneRegistry {
  pub fn new(
    zones: impl IntoIterator<Item = (String, Polygon)>,
    provider: Box<dyn ZoneProvider + Send>,
  ) -> Self {
    Self {
      zones: zones.into_iter().collect(),
      provider,
    }
  }

  /// 使用部署时的默认红区、绿区和信号灯区
  pub fn with_defaults(provider: Box<dyn ZoneProvider + Send>) -> Result<Self, ZoneError> {
    let zones = [
      (RED_ZONE, Polygon::try_from(DEFAULT_RED_ZONE)?),
      (GREEN_ZONE, Polygon::try_from(DEFAULT_GREEN_ZONE)?),
      (TRAFFIC_ZONE, Polygon::try_from(DEFAULT_TRAFFIC_ZONE)?),
    ];
    Ok(Self::new(
      zones.into_iter().map(|(name, p)| (name.to_string(), p)),
      provider,
    ))
  }

  pub fn get(&self, name: &str) -> Result<&Polygon, ZoneError> {
    self
      .zones
      .get(name)
      .ok_or_else(|| ZoneError::UnknownZone(name.to_string()))
  }

  /// 从配置来源刷新所有已注册区域；失败的区域保留原值
  pub fn reload(&mut self) -> ReloadReport {
    let mut report = ReloadReport::default();

    for (name, polygon) in self.zones.iter_mut() {
      match self.provider.load(name) {
        Ok(fresh) => {
          if *polygon != fresh {
            info!("区域 {} 已更新: {:?}", name, fresh.to_pairs());
          }
          *polygon = fresh;
          report.updated.push(name.clone());
        }
        Err(e) => {
          match self.provider.last_good(name) {
            Some(good) => warn!(
              "区域 {} 加载失败: {}，保留当前值（最近有效版本 {}）",
              name, e, good.version
            ),
            None => warn!("区域 {} 加载失败: {}，保留当前值", name, e),
          }
          report.retained.push(name.clone());
        }
      }
    }

    report
  }
}
