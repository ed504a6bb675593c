// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::RgbImage;

use crate::detection::Detection;

/// 一帧图像以及外部检测器给出的检测列表
#[derive(Debug, Clone)]
pub struct Frame {
  pub index: u64,
  pub image: RgbImage,
  pub detections: Vec<Detection>,
}

impl Frame {
  pub fn new(index: u64, image: RgbImage, detections: Vec<Detection>) -> Self {
    Self {
      index,
      image,
      detections,
    }
  }

  /// 没有图像数据时使用的黑帧
  pub fn blank(index: u64, width: u32, height: u32, detections: Vec<Detection>) -> Self {
    Self::new(index, RgbImage::new(width, height), detections)
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}
