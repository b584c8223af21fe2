// 该文件是 Xiling （西陵） 项目的一部分。
// src/letterbox.rs - 补边缩放预处理
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

use image::{RgbImage, imageops};
use tracing::debug;

use crate::{detection::BoundingBox, error::DetectError};

const RESIZE_FILTER: imageops::FilterType = imageops::FilterType::Triangle;

/// 补边与缩放记录，用于把检测框还原到原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxResult {
  pub pad_top: u32,
  pub pad_left: u32,
  /// 正方形边长 / 模型输入边长
  pub gain: f32,
  pub square_side: u32,
  pub original_width: u32,
  pub original_height: u32,
}

impl LetterboxResult {
  /// 根据原图尺寸计算补边量，较短的一边两侧补齐，顶部/左侧取下整
  pub fn compute(width: u32, height: u32, model_side: u32) -> Result<Self, DetectError> {
    if width == 0 || height == 0 {
      return Err(DetectError::invalid(format!(
        "图像尺寸为 0: {}x{}",
        width, height
      )));
    }
    if model_side == 0 {
      return Err(DetectError::invalid("模型输入边长为 0"));
    }

    let square_side = width.max(height);
    let pad = width.abs_diff(height);
    let (pad_top, pad_left) = if width > height {
      (pad / 2, 0)
    } else {
      (0, pad / 2)
    };

    Ok(Self {
      pad_top,
      pad_left,
      gain: square_side as f32 / model_side as f32,
      square_side,
      original_width: width,
      original_height: height,
    })
  }

  pub fn pad_bottom(&self) -> u32 {
    self.square_side - self.original_height - self.pad_top
  }

  pub fn pad_right(&self) -> u32 {
    self.square_side - self.original_width - self.pad_left
  }

  /// 原图坐标 → 模型输入坐标
  pub fn forward(&self, bbox: &BoundingBox) -> BoundingBox {
    let left = self.pad_left as f32;
    let top = self.pad_top as f32;
    BoundingBox {
      x1: (bbox.x1 + left) / self.gain,
      y1: (bbox.y1 + top) / self.gain,
      x2: (bbox.x2 + left) / self.gain,
      y2: (bbox.y2 + top) / self.gain,
    }
  }
}

/// 把图像补边为正方形（黑色填充），再缩放到 `model_side × model_side`
pub fn letterbox(image: &RgbImage, model_side: u32) -> Result<(RgbImage, LetterboxResult), DetectError> {
  let (width, height) = image.dimensions();
  let result = LetterboxResult::compute(width, height, model_side)?;

  debug!(
    "补边: {}x{} -> {}x{}, 上 {} 下 {} 左 {} 右 {}, 增益 {}",
    width,
    height,
    result.square_side,
    result.square_side,
    result.pad_top,
    result.pad_bottom(),
    result.pad_left,
    result.pad_right(),
    result.gain
  );

  let square = if width == height {
    image.clone()
  } else {
    let mut canvas = RgbImage::new(result.square_side, result.square_side);
    imageops::replace(
      &mut canvas,
      image,
      result.pad_left as i64,
      result.pad_top as i64,
    );
    canvas
  };

  let resized = if result.square_side == model_side {
    square
  } else {
    imageops::resize(&square, model_side, model_side, RESIZE_FILTER)
  };

  Ok((resized, result))
}

/// 不补边，直接拉伸到模型输入尺寸
pub fn stretch(
  image: &RgbImage,
  model_width: u32,
  model_height: u32,
) -> Result<RgbImage, DetectError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(DetectError::invalid(format!(
      "图像尺寸为 0: {}x{}",
      width, height
    )));
  }
  if (width, height) == (model_width, model_height) {
    return Ok(image.clone());
  }
  debug!(
    "拉伸: {}x{} -> {}x{}",
    width, height, model_width, model_height
  );
  Ok(imageops::resize(image, model_width, model_height, RESIZE_FILTER))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn square_image_needs_no_padding() {
    let image = RgbImage::from_pixel(320, 320, Rgb([10, 20, 30]));
    let (out, lb) = letterbox(&image, 640).unwrap();
    assert_eq!((lb.pad_top, lb.pad_left), (0, 0));
    assert_eq!(lb.gain, 320.0 / 640.0);
    assert_eq!(out.dimensions(), (640, 640));
  }

  #[test]
  fn wide_image_pads_top_and_bottom() {
    let lb = LetterboxResult::compute(1280, 720, 640).unwrap();
    assert_eq!(lb.pad_top, 280);
    assert_eq!(lb.pad_bottom(), 280);
    assert_eq!(lb.pad_left, 0);
    assert_eq!(lb.square_side, 1280);
    assert_eq!(lb.gain, 2.0);
  }

  #[test]
  fn odd_padding_puts_extra_pixel_on_far_side() {
    let lb = LetterboxResult::compute(101, 200, 100).unwrap();
    assert_eq!(lb.pad_top, 0);
    assert_eq!(lb.pad_left, 49);
    assert_eq!(lb.pad_right(), 50);
  }

  #[test]
  fn pads_split_within_one_pixel() {
    for (w, h) in [(3, 10), (10, 3), (640, 480), (481, 640), (1, 2), (1920, 1079)] {
      let lb = LetterboxResult::compute(w, h, 320).unwrap();
      let (a, b) = if w > h {
        (lb.pad_top, lb.pad_bottom())
      } else {
        (lb.pad_left, lb.pad_right())
      };
      assert_eq!(a + b, w.abs_diff(h));
      assert!(a.abs_diff(b) <= 1);
      assert!(lb.pad_top == 0 || lb.pad_left == 0);
      assert!(lb.gain > 0.0);
    }
  }

  #[test]
  fn padding_is_black_and_content_is_centered() {
    let image = RgbImage::from_pixel(4, 2, Rgb([200, 100, 50]));
    let (out, lb) = letterbox(&image, 4).unwrap();
    assert_eq!(lb.pad_top, 1);
    assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
    assert_eq!(out.get_pixel(0, 1), &Rgb([200, 100, 50]));
    assert_eq!(out.get_pixel(3, 2), &Rgb([200, 100, 50]));
    assert_eq!(out.get_pixel(3, 3), &Rgb([0, 0, 0]));
  }

  #[test]
  fn original_image_is_untouched() {
    let image = RgbImage::from_pixel(30, 10, Rgb([1, 2, 3]));
    let copy = image.clone();
    let _ = letterbox(&image, 16).unwrap();
    assert_eq!(image, copy);
  }

  #[test]
  fn zero_sized_image_is_invalid() {
    let image = RgbImage::new(0, 10);
    assert!(matches!(
      letterbox(&image, 640),
      Err(DetectError::InvalidInput(_))
    ));
    assert!(matches!(
      stretch(&image, 640, 640),
      Err(DetectError::InvalidInput(_))
    ));
  }

  #[test]
  fn stretch_ignores_aspect_ratio() {
    let image = RgbImage::new(100, 50);
    let out = stretch(&image, 64, 48).unwrap();
    assert_eq!(out.dimensions(), (64, 48));
  }
}
