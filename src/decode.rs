// 该文件是 Xiling （西陵） 项目的一部分。
// src/decode.rs - 量化多尺度检测头解码
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
use tracing::{debug, error};

use crate::{
  detection::{BoundingBox, RawDetection},
  error::DetectError,
  quant::QuantizedTensor,
};

// 每个锚框的通道: x, y, w, h, objectness
const BOX_CHANNELS: usize = 5;
const OBJECTNESS_CHANNEL: usize = 4;

const YOLOV5S_STRIDES: [u32; 3] = [8, 16, 32];
const YOLOV5S_ANCHORS: [[[f32; 2]; 3]; 3] = [
  [[10.0, 13.0], [16.0, 30.0], [33.0, 23.0]],
  [[30.0, 61.0], [62.0, 45.0], [59.0, 119.0]],
  [[116.0, 90.0], [156.0, 198.0], [373.0, 326.0]],
];
const COCO_CLASS_NUM: usize = 80;

/// 输出张量内的通道排布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
  /// [anchor * prop + k][row][col]，RKNN 默认输出
  #[default]
  Nchw,
  /// [row][col][anchor][k]
  Nhwc,
}

/// 边界框回归值的编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxEncoding {
  /// 中心: sigmoid(t) + grid；宽高: exp(t) * anchor
  #[default]
  Exponential,
  /// 中心: sigmoid(t) * 2 - 0.5 + grid；宽高: (sigmoid(t) * 2)^2 * anchor
  Yolov5,
}

/// 检测头配置，锚框单位为模型输入像素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
  pub num_classes: usize,
  pub strides: Vec<u32>,
  pub anchors: Vec<Vec<[f32; 2]>>,
  pub output_layout: OutputLayout,
  pub box_encoding: BoxEncoding,
}

impl Default for DecoderConfig {
  fn default() -> Self {
    Self {
      num_classes: COCO_CLASS_NUM,
      strides: YOLOV5S_STRIDES.to_vec(),
      anchors: YOLOV5S_ANCHORS.iter().map(|a| a.to_vec()).collect(),
      output_layout: OutputLayout::default(),
      box_encoding: BoxEncoding::default(),
    }
  }
}

impl DecoderConfig {
  pub fn prop_size(&self) -> usize {
    BOX_CHANNELS + self.num_classes
  }

  pub fn validate(&self) -> Result<(), String> {
    if self.num_classes == 0 {
      return Err("num_classes 不能为 0".to_string());
    }
    if self.strides.is_empty() || self.strides.contains(&0) {
      return Err(format!("步长配置无效: {:?}", self.strides));
    }
    if self.anchors.len() != self.strides.len() {
      return Err(format!(
        "锚框组数 {} 与步长数量 {} 不一致",
        self.anchors.len(),
        self.strides.len()
      ));
    }
    if self.anchors.iter().any(|a| a.is_empty()) {
      return Err("每个检测头至少需要一个锚框".to_string());
    }
    for (i, stride) in self.strides.iter().enumerate() {
      if self.strides[..i].contains(stride) {
        return Err(format!("步长 {} 重复出现", stride));
      }
    }
    Ok(())
  }

  fn anchors_for(&self, stride: u32) -> Option<&[[f32; 2]]> {
    self
      .strides
      .iter()
      .position(|&s| s == stride)
      .map(|i| self.anchors[i].as_slice())
  }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 某个检测头的网格几何
struct Grid {
  height: usize,
  width: usize,
  anchors: usize,
  prop: usize,
}

impl Grid {
  fn len(&self) -> usize {
    self.height * self.width
  }

  fn element_count(&self) -> usize {
    self.len() * self.anchors * self.prop
  }

  #[inline]
  fn offset(&self, layout: OutputLayout, row: usize, col: usize, anchor: usize, k: usize) -> usize {
    match layout {
      OutputLayout::Nchw => (anchor * self.prop + k) * self.len() + row * self.width + col,
      OutputLayout::Nhwc => ((row * self.width + col) * self.anchors + anchor) * self.prop + k,
    }
  }
}

/// 解码三个量化输出张量，返回置信度不低于阈值的候选框
///
/// 输出顺序: 步长升序，网格行优先，锚框序号升序。
pub fn decode(
  tensors: &[QuantizedTensor<'_>],
  model_width: u32,
  model_height: u32,
  conf_threshold: f32,
  config: &DecoderConfig,
) -> Result<Vec<RawDetection>, DetectError> {
  if tensors.len() != config.strides.len() {
    error!(
      "预期输出张量数量为 {}, 实际为 {}",
      config.strides.len(),
      tensors.len()
    );
    // 第一个缺失或多余的检测头位置
    return Err(DetectError::TensorShapeMismatch {
      index: tensors.len().min(config.strides.len()),
      expected: config.strides.len(),
      actual: tensors.len(),
    });
  }

  let mut order: Vec<usize> = (0..tensors.len()).collect();
  order.sort_by_key(|&i| tensors[i].stride);

  let mut items = Vec::new();
  let mut previous_stride = None;
  for index in order {
    let tensor = &tensors[index];

    // 每个步长只能对应一个输出张量和一组锚框
    let anchors = match config.anchors_for(tensor.stride) {
      Some(anchors) if previous_stride != Some(tensor.stride) => anchors,
      _ => {
        error!(
          "检测头 {}: 步长 {} 与锚框配置 {:?} 不对应",
          index, tensor.stride, config.strides
        );
        return Err(DetectError::TensorShapeMismatch {
          index,
          expected: 0,
          actual: tensor.len(),
        });
      }
    };
    previous_stride = Some(tensor.stride);

    let stride = tensor.stride as usize;
    let grid = Grid {
      height: model_height as usize / stride,
      width: model_width as usize / stride,
      anchors: anchors.len(),
      prop: config.prop_size(),
    };
    let expected = grid.element_count();

    if model_width as usize % stride != 0 || model_height as usize % stride != 0 {
      error!(
        "检测头 {}: 步长 {} 不能整除模型输入 {}x{}",
        index, stride, model_width, model_height
      );
      return Err(DetectError::TensorShapeMismatch {
        index,
        expected,
        actual: tensor.len(),
      });
    }

    if tensor.len() != expected || grid.len() == 0 {
      error!(
        "检测头 {}: 输出大小不匹配 - 实际 {}, 期望 {} ({}x{}x{}x{})",
        index,
        tensor.len(),
        expected,
        grid.height,
        grid.width,
        grid.anchors,
        grid.prop
      );
      return Err(DetectError::TensorShapeMismatch {
        index,
        expected,
        actual: tensor.len(),
      });
    }

    let before = items.len();
    decode_head(tensor, &grid, anchors, conf_threshold, config, &mut items);
    debug!(
      "检测头 {} (步长 {}): 网格 {}x{}, 候选框 {} 个",
      index,
      tensor.stride,
      grid.height,
      grid.width,
      items.len() - before
    );
  }

  Ok(items)
}

fn decode_head(
  tensor: &QuantizedTensor<'_>,
  grid: &Grid,
  anchors: &[[f32; 2]],
  conf_threshold: f32,
  config: &DecoderConfig,
  items: &mut Vec<RawDetection>,
) {
  let layout = config.output_layout;
  let stride = tensor.stride as f32;

  for row in 0..grid.height {
    for col in 0..grid.width {
      for (a, &[anchor_w, anchor_h]) in anchors.iter().enumerate() {
        let at = |k: usize| tensor.value(grid.offset(layout, row, col, a, k));

        // 类别分数不超过 1，objectness 低于阈值时置信度必然低于阈值
        let objectness = sigmoid(at(OBJECTNESS_CHANNEL));
        if objectness < conf_threshold {
          continue;
        }

        let mut max_logit = f32::NEG_INFINITY;
        let mut class_id = 0u32;
        for c in 0..config.num_classes {
          let logit = at(BOX_CHANNELS + c);
          if logit > max_logit {
            max_logit = logit;
            class_id = c as u32;
          }
        }

        let confidence = objectness * sigmoid(max_logit);
        if confidence < conf_threshold {
          continue;
        }

        let (tx, ty, tw, th) = (at(0), at(1), at(2), at(3));
        let (cx, cy, w, h) = match config.box_encoding {
          BoxEncoding::Exponential => (
            (sigmoid(tx) + col as f32) * stride,
            (sigmoid(ty) + row as f32) * stride,
            tw.exp() * anchor_w,
            th.exp() * anchor_h,
          ),
          BoxEncoding::Yolov5 => {
            let sw = sigmoid(tw) * 2.0;
            let sh = sigmoid(th) * 2.0;
            (
              (sigmoid(tx) * 2.0 - 0.5 + col as f32) * stride,
              (sigmoid(ty) * 2.0 - 0.5 + row as f32) * stride,
              sw * sw * anchor_w,
              sh * sh * anchor_h,
            )
          }
        };

        items.push(RawDetection {
          bbox: BoundingBox::from_center(cx, cy, w, h),
          class_id,
          confidence,
        });
      }
    }
  }
}
