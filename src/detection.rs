// 该文件是 Xiling （西陵） 项目的一部分。
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

use serde::Serialize;

/// 轴对齐边界框，[x1, y1] 为左上角，[x2, y2] 为右下角
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BoundingBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// 由中心点与宽高构造
  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self {
      x1: cx - w / 2.0,
      y1: cy - h / 2.0,
      x2: cx + w / 2.0,
      y2: cy + h / 2.0,
    }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 面积；倒置的框视为 0
  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }
}

/// 解码阶段产生的候选框，坐标位于模型输入空间
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
  pub bbox: BoundingBox,
  pub class_id: u32,
  pub confidence: f32,
}

/// 经过 NMS 与坐标还原后的最终检测结果，坐标位于原图空间
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub class_id: u32,
  pub class_name: String,
  pub confidence: f32,
  #[serde(flatten)]
  pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionSet {
  pub items: Box<[Detection]>,
}

impl DetectionSet {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

impl From<Vec<Detection>> for DetectionSet {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}
