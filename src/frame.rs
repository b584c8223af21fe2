// 该文件是 Xiling （西陵） 项目的一部分。
// src/frame.rs - 模型输入帧（NHWC / NCHW）
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

use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

pub const RGB_CHANNELS: usize = 3;

/// 输入张量的内存排布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
  #[default]
  Nhwc,
  Nchw,
}

/// 模型输入属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAttr {
  pub layout: TensorLayout,
  pub width: u32,
  pub height: u32,
}

impl InputAttr {
  pub fn size(&self) -> usize {
    RGB_CHANNELS * self.width as usize * self.height as usize
  }
}

/// 已排布好的 uint8 RGB 输入帧
#[derive(Debug, Clone)]
pub struct RgbFrame {
  layout: TensorLayout,
  width: usize,
  height: usize,
  data: Box<[u8]>,
}

impl RgbFrame {
  pub fn with_shape(layout: TensorLayout, height: usize, width: usize) -> Self {
    let size = RGB_CHANNELS * width * height;
    Self {
      layout,
      width,
      height,
      data: vec![0u8; size].into_boxed_slice(),
    }
  }

  pub fn from_image(image: &RgbImage, layout: TensorLayout) -> Self {
    match layout {
      // RgbImage 本身就是 HWC 排布
      TensorLayout::Nhwc => Self {
        layout,
        width: image.width() as usize,
        height: image.height() as usize,
        data: image.as_raw().clone().into_boxed_slice(),
      },
      TensorLayout::Nchw => {
        let (width, height) = image.dimensions();
        let mut frame = Self::with_shape(layout, height as usize, width as usize);
        let plane = (width * height) as usize;
        for (x, y, pixel) in image.enumerate_pixels() {
          let idx = (y * width + x) as usize;
          for c in 0..RGB_CHANNELS {
            frame.data[c * plane + idx] = pixel[c];
          }
        }
        frame
      }
    }
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    let width = self.width as u32;
    let height = self.height as u32;
    let plane = self.width * self.height;
    let data = &self.data;

    ImageBuffer::from_fn(width, height, |x, y| {
      let idx = y as usize * self.width + x as usize;
      match self.layout {
        TensorLayout::Nhwc => Rgb([data[idx * 3], data[idx * 3 + 1], data[idx * 3 + 2]]),
        TensorLayout::Nchw => Rgb([data[idx], data[plane + idx], data[2 * plane + idx]]),
      }
    })
  }
}
