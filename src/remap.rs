// 该文件是 Xiling （西陵） 项目的一部分。
// src/remap.rs - 检测框坐标还原
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

use crate::{
  detection::{BoundingBox, Detection, RawDetection},
  labels::Labels,
  letterbox::LetterboxResult,
};

/// 预处理时施加的几何变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateTransform {
  Letterbox(LetterboxResult),
  /// 直接缩放，比例为 模型输入 / 原图
  Resize { width_ratio: f32, height_ratio: f32 },
}

impl CoordinateTransform {
  pub fn identity() -> Self {
    CoordinateTransform::Resize {
      width_ratio: 1.0,
      height_ratio: 1.0,
    }
  }

  pub fn resize(model_width: u32, model_height: u32, original_width: u32, original_height: u32) -> Self {
    CoordinateTransform::Resize {
      width_ratio: model_width as f32 / original_width as f32,
      height_ratio: model_height as f32 / original_height as f32,
    }
  }

  fn invert(&self, x: f32, y: f32) -> (f32, f32) {
    match self {
      CoordinateTransform::Letterbox(lb) => (
        x * lb.gain - lb.pad_left as f32,
        y * lb.gain - lb.pad_top as f32,
      ),
      CoordinateTransform::Resize {
        width_ratio,
        height_ratio,
      } => (x / width_ratio, y / height_ratio),
    }
  }
}

/// 把模型输入空间的检测框映射回原图，并截断到图像边界
///
/// 不修正 x2 < x1 这类倒置框，原样传递。
pub fn remap(
  raw: &RawDetection,
  transform: &CoordinateTransform,
  original_width: u32,
  original_height: u32,
  labels: &Labels,
) -> Detection {
  let (w, h) = (original_width as f32, original_height as f32);
  let (x1, y1) = transform.invert(raw.bbox.x1, raw.bbox.y1);
  let (x2, y2) = transform.invert(raw.bbox.x2, raw.bbox.y2);

  Detection {
    class_id: raw.class_id,
    class_name: labels.name(raw.class_id).to_string(),
    confidence: raw.confidence,
    bbox: BoundingBox {
      x1: x1.clamp(0.0, w),
      y1: y1.clamp(0.0, h),
      x2: x2.clamp(0.0, w),
      y2: y2.clamp(0.0, h),
    },
  }
}
