// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/detection.rs - 检测结果定义
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 唯一参与跟踪的检测类别
pub const VEHICLE_LABEL: &str = "car";

#[derive(Error, Debug, PartialEq)]
pub enum DetectionError {
  #[error("检测框坐标无效: {0:?}")]
  InvalidBox([f32; 4]),
  #[error("置信度无效: {0}")]
  InvalidConfidence(f32),
  #[error("帧尺寸无效: {0}x{1}")]
  InvalidFrameSize(u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
  pub x: i32,
  pub y: i32,
}

impl Point {
  pub const fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }

  pub fn distance(&self, other: &Point) -> f64 {
    let dx = (self.x - other.x) as f64;
    let dy = (self.y - other.y) as f64;
    (dx * dx + dy * dy).sqrt()
  }
}

impl From<(i32, i32)> for Point {
  fn from((x, y): (i32, i32)) -> Self {
    Self { x, y }
  }
}

/// 像素坐标下的检测框 [x1, y1, x2, y2]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl BoundingBox {
  pub fn center(&self) -> Point {
    Point::new(
      self.x1 + (self.x2 - self.x1) / 2,
      self.y1 + (self.y2 - self.y1) / 2,
    )
  }
}

/// 外部检测器给出的单个检测结果，bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub bbox: [f32; 4],
  pub confidence: f32,
}

/// 反归一化之后、可以直接参与匹配的检测
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub bbox: BoundingBox,
  pub center: Point,
  pub confidence: f32,
}

impl Detection {
  pub fn new(label: impl Into<String>, bbox: [f32; 4], confidence: f32) -> Self {
    Self {
      label: label.into(),
      bbox,
      confidence,
    }
  }

  pub fn is_vehicle(&self) -> bool {
    self.label == VEHICLE_LABEL
  }

  /// 按帧尺寸转换为像素坐标，坐标向零截断
  pub fn denormalize(&self, width: u32, height: u32) -> Result<Candidate, DetectionError> {
    if width == 0 || height == 0 {
      return Err(DetectionError::InvalidFrameSize(width, height));
    }

    let [x_min, y_min, x_max, y_max] = self.bbox;
    let in_range = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
    if !self.bbox.iter().all(|v| in_range(*v)) || x_min > x_max || y_min > y_max {
      return Err(DetectionError::InvalidBox(self.bbox));
    }
    if !self.confidence.is_finite() {
      return Err(DetectionError::InvalidConfidence(self.confidence));
    }

    let (w, h) = (width as f64, height as f64);
    let bbox = BoundingBox {
      x1: (x_min as f64 * w) as i32,
      y1: (y_min as f64 * h) as i32,
      x2: (x_max as f64 * w) as i32,
      y2: (y_max as f64 * h) as i32,
    };

    Ok(Candidate {
      bbox,
      center: bbox.center(),
      confidence: self.confidence,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn denormalize_uses_integer_center() {
    let det = Detection::new("car", [0.25, 0.5, 0.5, 0.75], 0.9);
    let c = det.denormalize(1024, 512).unwrap();
    assert_eq!(
      c.bbox,
      BoundingBox {
        x1: 256,
        y1: 256,
        x2: 512,
        y2: 384
      }
    );
    assert_eq!(c.center, Point::new(384, 320));
  }

  #[test]
  fn odd_box_center_truncates() {
    let bbox = BoundingBox {
      x1: 10,
      y1: 10,
      x2: 15,
      y2: 13,
    };
    assert_eq!(bbox.center(), Point::new(12, 11));
  }

  #[test]
  fn rejects_malformed_boxes() {
    let flipped = Detection::new("car", [0.5, 0.1, 0.2, 0.3], 0.8);
    assert!(matches!(
      flipped.denormalize(100, 100),
      Err(DetectionError::InvalidBox(_))
    ));

    let nan = Detection::new("car", [f32::NAN, 0.1, 0.2, 0.3], 0.8);
    assert!(nan.denormalize(100, 100).is_err());

    let outside = Detection::new("car", [0.1, 0.1, 1.2, 0.3], 0.8);
    assert!(outside.denormalize(100, 100).is_err());

    let ok = Detection::new("car", [0.1, 0.1, 0.2, 0.3], 0.8);
    assert_eq!(
      ok.denormalize(0, 100),
      Err(DetectionError::InvalidFrameSize(0, 100))
    );
  }

  #[test]
  fn only_cars_are_vehicles() {
    assert!(Detection::new("car", [0.0; 4], 1.0).is_vehicle());
    assert!(!Detection::new("truck", [0.0; 4], 1.0).is_vehicle());
  }
}
