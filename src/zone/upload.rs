// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/zone/upload.rs - 区域上传校验
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::zone::{Polygon, ZoneError, file_provider::zone_file};

const UPLOAD_VERTICES: usize = 4;

/// 外部接口上传的区域，写入 [`FileZoneProvider`](crate::zone::FileZoneProvider) 读取的同一文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneUpload {
  pub name: String,
  pub points: Vec<[f64; 2]>,
}

impl ZoneUpload {
  pub fn new(name: impl Into<String>, points: Vec<[f64; 2]>) -> Self {
    Self {
      name: name.into(),
      points,
    }
  }

  /// 必须恰好 4 个顶点，坐标位于帧范围内
  pub fn validate(&self, frame_width: u32, frame_height: u32) -> Result<Polygon, ZoneError> {
    if self.name.is_empty()
      || !self
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
      return Err(ZoneError::InvalidUpload(format!(
        "区域名称 '{}' 只能包含字母、数字、下划线和连字符",
        self.name
      )));
    }

    if self.points.len() != UPLOAD_VERTICES {
      return Err(ZoneError::InvalidUpload(format!(
        "区域 {} 需要恰好 {} 个顶点, 实际 {} 个",
        self.name,
        UPLOAD_VERTICES,
        self.points.len()
      )));
    }

    let (w, h) = (frame_width as f64, frame_height as f64);
    for (i, [x, y]) in self.points.iter().enumerate() {
      if !(x.is_finite() && (0.0..=w).contains(x)) || !(y.is_finite() && (0.0..=h).contains(y)) {
        return Err(ZoneError::InvalidUpload(format!(
          "区域 {} 第 {} 个顶点 ({}, {}) 超出帧范围 {}x{}",
          self.name, i, x, y, frame_width, frame_height
        )));
      }
    }

    Polygon::from_pairs(&self.points)
  }

  /// 校验后写入 `<directory>/<name>.json`，先写临时文件再重命名
  pub fn write_to(
    &self,
    directory: &Path,
    frame_width: u32,
    frame_height: u32,
  ) -> Result<PathBuf, ZoneError> {
    self.validate(frame_width, frame_height)?;

    std::fs::create_dir_all(directory)?;
    let path = zone_file(directory, &self.name);
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, serde_json::to_vec(&self.points)?)?;
    std::fs::rename(&staging, &path)?;

    info!("区域 {} 已写入 {}", self.name, path.display());
    Ok(path)
  }
}
