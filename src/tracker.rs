// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/tracker.rs - 车辆跟踪
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

//! 基于中心点距离的贪心最近邻跟踪。
//!
//! 已有轨迹按 id 升序依次挑选最近且未被占用的检测，距离需小于阈值；
//! 未匹配的检测分配新 id。匹配结果依赖输入顺序，相同输入得到相同结果。

use std::collections::BTreeMap;

use tracing::debug;

use crate::detection::{BoundingBox, Candidate, Detection, Point};

pub type TrackId = u64;

const DEFAULT_DISTANCE_THRESHOLD: f64 = 50.0;
const DEFAULT_MAX_UNSEEN_FRAMES: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
  /// 中心点匹配距离阈值（像素，严格小于）
  pub distance_threshold: f64,
  /// 超过该帧数未出现的轨迹被删除
  pub max_unseen_frames: u64,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
      max_unseen_frames: DEFAULT_MAX_UNSEEN_FRAMES,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
  pub id: TrackId,
  pub bbox: BoundingBox,
  pub center: Point,
  pub first_seen: u64,
  pub last_seen: u64,
  pub frames_tracked: u64,
  counted_in_total: bool,
  counted_as_runner: bool,
  evidence_saved: bool,
}

impl Track {
  fn spawn(id: TrackId, frame_index: u64, candidate: &Candidate) -> Self {
    Self {
      id,
      bbox: candidate.bbox,
      center: candidate.center,
      first_seen: frame_index,
      last_seen: frame_index,
      frames_tracked: 0,
      counted_in_total: false,
      counted_as_runner: false,
      evidence_saved: false,
    }
  }

  fn observe(&mut self, frame_index: u64, candidate: &Candidate) {
    self.bbox = candidate.bbox;
    self.center = candidate.center;
    self.last_seen = frame_index;
    self.frames_tracked += 1;
  }

  pub fn counted_in_total(&self) -> bool {
    self.counted_in_total
  }

  pub fn counted_as_runner(&self) -> bool {
    self.counted_as_runner
  }

  pub fn evidence_saved(&self) -> bool {
    self.evidence_saved
  }

  pub(crate) fn mark_counted(&mut self) {
    self.counted_in_total = true;
  }

  pub(crate) fn mark_runner(&mut self) {
    debug_assert!(self.counted_in_total, "未计数的轨迹不能标记为闯红灯");
    self.counted_as_runner = true;
  }

  pub(crate) fn mark_evidence_saved(&mut self) {
    self.evidence_saved = true;
  }
}

#[derive(Debug, Default)]
pub struct ObjectTracker {
  config: TrackerConfig,
  tracks: BTreeMap<TrackId, Track>,
  next_id: TrackId,
}

impl ObjectTracker {
  pub fn new(config: TrackerConfig) -> Self {
    Self {
      config,
      tracks: BTreeMap::new(),
      next_id: 0,
    }
  }

  pub fn config(&self) -> &TrackerConfig {
    &self.config
  }

  /// 下一个将被分配的轨迹 id
  pub fn next_id(&self) -> TrackId {
    self.next_id
  }

  pub fn active_tracks(&self) -> &BTreeMap<TrackId, Track> {
    &self.tracks
  }

  pub(crate) fn active_tracks_mut(&mut self) -> &mut BTreeMap<TrackId, Track> {
    &mut self.tracks
  }

  pub fn update(
    &mut self,
    frame_index: u64,
    detections: &[Detection],
    frame_width: u32,
    frame_height: u32,
  ) {
    let candidates: Vec<Candidate> = detections
      .iter()
      .filter(|det| det.is_vehicle())
      .filter_map(|det| match det.denormalize(frame_width, frame_height) {
        Ok(candidate) => Some(candidate),
        Err(e) => {
          debug!("帧 {} 丢弃无效检测: {}", frame_index, e);
          None
        }
      })
      .collect();

    self.expire(frame_index);

    let threshold = self.config.distance_threshold;
    let mut claimed = vec![false; candidates.len()];
    for track in self.tracks.values_mut() {
      let mut nearest: Option<(usize, f64)> = None;
      for (i, candidate) in candidates.iter().enumerate() {
        if claimed[i] {
          continue;
        }
        let dist = track.center.distance(&candidate.center);
        if dist < threshold && nearest.is_none_or(|(_, best)| dist < best) {
          nearest = Some((i, dist));
        }
      }

      if let Some((i, _)) = nearest {
        claimed[i] = true;
        track.observe(frame_index, &candidates[i]);
      }
    }

    for (candidate, _) in candidates
      .iter()
      .zip(claimed.iter())
      .filter(|(_, claimed)| !**claimed)
    {
      let id = self.next_id;
      self.next_id += 1;
      debug!("帧 {} 新建轨迹 {} @ {:?}", frame_index, id, candidate.center);
      self
        .tracks
        .insert(id, Track::spawn(id, frame_index, candidate));
    }
  }

  fn expire(&mut self, frame_index: u64) {
    let max_unseen = self.config.max_unseen_frames;
    self.tracks.retain(|id, track| {
      let keep = frame_index.saturating_sub(track.last_seen) <= max_unseen;
      if !keep {
        debug!("轨迹 {} 已 {} 帧未出现，删除", id, frame_index - track.last_seen);
      }
      keep
    });
  }
}
