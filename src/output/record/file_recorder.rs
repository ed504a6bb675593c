// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/output/record/file_recorder.rs - 追加写入的车辆记录文件
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

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use url::Url;

use super::{RecordError, VehicleRecorder};
use crate::{FromUrl, FromUrlWithScheme, violation::VehicleRecord};

/// JSON Lines 格式，每行一条 `VehicleRecord`
pub struct FileRecorder {
  path: PathBuf,
  file: File,
}

impl FromUrlWithScheme for FileRecorder {
  const SCHEME: &'static str = "record";
}

impl FromUrl for FileRecorder {
  type Error = RecordError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordError::SchemeMismatch);
    }
    FileRecorder::open(url.path())
  }
}

impl FileRecorder {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
      && !parent.exists()
    {
      std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    info!("车辆记录文件: {}", path.display());
    Ok(Self { path, file })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 读回全部记录，无法解析的行记日志后跳过
  pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<VehicleRecord>, RecordError> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      match serde_json::from_str::<VehicleRecord>(&line) {
        Ok(record) => records.push(record),
        Err(e) => warn!("跳过第 {} 行车辆记录: {}", number + 1, e),
      }
    }
    Ok(records)
  }
}

impl VehicleRecorder for FileRecorder {
  fn record_vehicle(&mut self, record: &VehicleRecord) -> Result<(), RecordError> {
    // 整行先在内存里拼好，避免半行落盘
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    self.file.write_all(&line)?;
    self.file.flush()?;
    debug!("写入车辆记录: runner={}", record.is_runner);
    Ok(())
  }
}
