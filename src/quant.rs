// 该文件是 Xiling （西陵） 项目的一部分。
// src/quant.rs - 量化张量与反量化
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

/// 仿射量化参数: real = (raw - zero_point) * scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
  pub scale: f32,
  pub zero_point: i32,
}

impl QuantParams {
  pub fn new(scale: f32, zero_point: i32) -> Self {
    Self { scale, zero_point }
  }

  #[inline]
  pub fn dequantize(&self, raw: i8) -> f32 {
    (raw as i32 - self.zero_point) as f32 * self.scale
  }

  /// 反向量化，结果截断到 i8 范围
  #[inline]
  pub fn quantize(&self, value: f32) -> i8 {
    let q = (value / self.scale).round() as i32 + self.zero_point;
    q.clamp(i8::MIN as i32, i8::MAX as i32) as i8
  }
}

/// 加速器的一个输出张量（只读借用）
#[derive(Debug, Clone, Copy)]
pub struct QuantizedTensor<'a> {
  pub data: &'a [i8],
  pub stride: u32,
  pub params: QuantParams,
}

impl<'a> QuantizedTensor<'a> {
  pub fn new(data: &'a [i8], stride: u32, params: QuantParams) -> Self {
    Self {
      data,
      stride,
      params,
    }
  }

  #[inline]
  pub fn value(&self, offset: usize) -> f32 {
    self.params.dequantize(self.data[offset])
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}
