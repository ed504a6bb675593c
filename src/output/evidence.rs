// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/output/evidence.rs - 违章证据图像保存
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

use chrono::{DateTime, Local};
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, violation::EvidenceRequest};

pub const DEFAULT_EVIDENCE_DIR: &str = "red_light_runners";

#[derive(Error, Debug)]
pub enum EvidenceError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 证据图像目录，数量上限由判定引擎控制
#[derive(Debug, Clone)]
pub struct EvidenceStore {
  directory: PathBuf,
}

impl FromUrlWithScheme for EvidenceStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for EvidenceStore {
  type Error = EvidenceError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(EvidenceError::SchemeMismatch);
    }
    Ok(EvidenceStore::new(uri.path()))
  }
}

impl Default for EvidenceStore {
  fn default() -> Self {
    Self::new(DEFAULT_EVIDENCE_DIR)
  }
}

impl EvidenceStore {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn evidence_path(&self, now: DateTime<Local>, request: &EvidenceRequest) -> PathBuf {
    self.directory.join(format!(
      "{}_red_light_runner_id_{}.jpg",
      now.format("%Y-%m-%d %H-%M-%S"),
      request.track_id
    ))
  }

  pub fn save(&self, frame: &RgbImage, request: &EvidenceRequest) -> Result<PathBuf, EvidenceError> {
    if !self.directory.exists() {
      std::fs::create_dir_all(&self.directory)?;
    }

    let path = self.evidence_path(Local::now(), request);
    if let Err(e) = frame.save(&path) {
      error!("保存证据图像 {} 失败: {}", path.display(), e);
      return Err(e.into());
    }

    info!("保存闯红灯证据图像: {}", path.display());
    Ok(path)
  }
}
