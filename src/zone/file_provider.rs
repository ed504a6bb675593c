// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/zone/file_provider.rs - 基于 JSON 文件的区域来源
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

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  zone::{Polygon, Versioned, ZoneError, ZoneProvider},
};

/// 每个区域对应目录下的 `<name>.json`，内容为 `[[x, y], ...]`
#[derive(Debug)]
pub struct FileZoneProvider {
  directory: PathBuf,
  last_good: HashMap<String, Versioned<Polygon>>,
  version: u64,
}

impl FileZoneProvider {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      last_good: HashMap::new(),
      version: 0,
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn zone_path(&self, name: &str) -> PathBuf {
    zone_file(&self.directory, name)
  }
}

pub(crate) fn zone_file(directory: &Path, name: &str) -> PathBuf {
  directory.join(format!("{}.json", name))
}

impl FromUrlWithScheme for FileZoneProvider {
  const SCHEME: &'static str = "zones";
}

impl FromUrl for FileZoneProvider {
  type Error = ZoneError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ZoneError::SchemeMismatch);
    }
    Ok(FileZoneProvider::new(url.path()))
  }
}

impl ZoneProvider for FileZoneProvider {
  fn load(&mut self, name: &str) -> Result<Polygon, ZoneError> {
    let path = self.zone_path(name);
    let data = std::fs::read_to_string(&path)?;
    let pairs: Vec<[f64; 2]> = serde_json::from_str(&data)?;
    let polygon = Polygon::from_pairs(&pairs)?;

    self.version += 1;
    debug!("读取区域文件 {} (版本 {})", path.display(), self.version);
    self.last_good.insert(
      name.to_string(),
      Versioned {
        version: self.version,
        value: polygon.clone(),
      },
    );
    Ok(polygon)
  }

  fn last_good(&self, name: &str) -> Option<&Versioned<Polygon>> {
    self.last_good.get(name)
  }
}
