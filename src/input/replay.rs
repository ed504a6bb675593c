// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/input/replay.rs - 检测结果回放输入
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

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, detection::Detection, frame::Frame, light::ActivitySignal,
};

#[derive(Error, Debug)]
pub enum ReplayInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 回放文件中的一行
#[derive(Debug, Deserialize)]
struct ReplayLine {
  width: u32,
  height: u32,
  #[serde(default)]
  activity: i64,
  #[serde(default)]
  image: Option<PathBuf>,
  #[serde(default)]
  detections: Vec<serde_json::Value>,
}

/// 逐行读取 JSON，每行一帧检测结果
pub struct ReplayInput {
  lines: Lines<Box<dyn BufRead + Send>>,
  base_dir: Option<PathBuf>,
  activity: Option<ActivitySignal>,
  line_number: usize,
  frame_index: u64,
}

impl FromUrlWithScheme for ReplayInput {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayInput {
  type Error = ReplayInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayInputError::SchemeMismatch);
    }
    ReplayInput::open(url.path())
  }
}

impl ReplayInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayInputError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    info!("打开回放文件: {}", path.display());

    let mut input = Self::from_reader(BufReader::new(file));
    input.base_dir = path.parent().map(Path::to_path_buf);
    Ok(input)
  }

  pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
    let reader: Box<dyn BufRead + Send> = Box::new(reader);
    Self {
      lines: reader.lines(),
      base_dir: None,
      activity: None,
      line_number: 0,
      frame_index: 0,
    }
  }

  /// 回放时把每帧记录的活动量写入信号
  pub fn with_activity_signal(mut self, activity: ActivitySignal) -> Self {
    self.activity = Some(activity);
    self
  }

  fn resolve_image(&self, path: &Path) -> PathBuf {
    match &self.base_dir {
      Some(base) if path.is_relative() => base.join(path),
      _ => path.to_path_buf(),
    }
  }

  fn build_frame(&mut self, line: ReplayLine) -> Frame {
    let detections = line
      .detections
      .into_iter()
      .filter_map(|value| match serde_json::from_value::<Detection>(value) {
        Ok(det) => Some(det),
        Err(e) => {
          warn!("第 {} 行包含无效检测，已丢弃: {}", self.line_number, e);
          None
        }
      })
      .collect();

    let index = self.frame_index;
    self.frame_index += 1;

    if let Some(activity) = &self.activity {
      activity.store(line.activity);
    }

    let Some(image_path) = line.image else {
      return Frame::blank(index, line.width, line.height, detections);
    };

    let image_path = self.resolve_image(&image_path);
    match image::open(&image_path) {
      Ok(image) => {
        let image = image.to_rgb8();
        if image.dimensions() == (line.width, line.height) {
          Frame::new(index, image, detections)
        } else {
          warn!(
            "图像 {} 尺寸 {:?} 与记录 {}x{} 不符，使用空白帧",
            image_path.display(),
            image.dimensions(),
            line.width,
            line.height
          );
          Frame::blank(index, line.width, line.height, detections)
        }
      }
      Err(e) => {
        warn!("读取图像 {} 失败: {}，使用空白帧", image_path.display(), e);
        Frame::blank(index, line.width, line.height, detections)
      }
    }
  }
}

impl Iterator for ReplayInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let line = match self.lines.next()? {
        Ok(line) => line,
        Err(e) => {
          warn!("读取回放文件失败: {}", e);
          return None;
        }
      };
      self.line_number += 1;

      if line.trim().is_empty() {
        continue;
      }

      match serde_json::from_str::<ReplayLine>(&line) {
        Ok(parsed) => return Some(self.build_frame(parsed)),
        Err(e) => warn!("跳过第 {} 行: {}", self.line_number, e),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn replay(content: &str) -> ReplayInput {
    ReplayInput::from_reader(Cursor::new(content.to_string()))
  }

  #[test]
  fn yields_one_frame_per_line() {
    let content = r#"{"width": 64, "height": 48, "detections": [{"label": "car", "bbox": [0.1, 0.1, 0.2, 0.2], "confidence": 0.9}]}
{"width": 64, "height": 48}
"#;
    let frames: Vec<Frame> = replay(content).collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[1].index, 1);
    assert_eq!((frames[0].width(), frames[0].height()), (64, 48));
    assert_eq!(frames[0].detections.len(), 1);
    assert!(frames[1].detections.is_empty());
  }

  #[test]
  fn malformed_lines_and_detections_are_skipped() {
    let content = r#"not json
{"width": 32, "height": 32, "detections": [{"label": "car"}, {"label": "truck", "bbox": [0.0, 0.0, 0.5, 0.5], "confidence": 0.5}]}

{"height": 32}
"#;
    let frames: Vec<Frame> = replay(content).collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].detections.len(), 1);
    assert_eq!(frames[0].detections[0].label, "truck");
  }

  #[test]
  fn activity_is_written_to_signal() {
    let signal = ActivitySignal::new();
    let mut input = replay(
      "{\"width\": 8, \"height\": 8, \"activity\": 120}\n{\"width\": 8, \"height\": 8}\n",
    )
    .with_activity_signal(signal.clone());

    input.next().unwrap();
    assert_eq!(signal.load(), 120);
    input.next().unwrap();
    assert_eq!(signal.load(), 0);
  }

  #[test]
  fn missing_image_falls_back_to_blank_frame() {
    let mut input = replay(
      "{\"width\": 16, \"height\": 12, \"image\": \"/nonexistent/hongdeng/frame.png\"}\n",
    );
    let frame = input.next().unwrap();
    assert_eq!((frame.width(), frame.height()), (16, 12));
    assert!(frame.image.pixels().all(|p| p.0 == [0, 0, 0]));
  }

  #[test]
  fn from_url_rejects_other_schemes() {
    let url = Url::parse("image:///tmp/frames.jsonl").unwrap();
    assert!(matches!(
      ReplayInput::from_url(&url),
      Err(ReplayInputError::SchemeMismatch)
    ));
  }
}
