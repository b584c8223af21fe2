// 该文件是 Xiling （西陵） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};

use crate::detection::{Detection, DetectionSet};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 3;
const PALETTE_SIZE: usize = 80;

/// 按类别分配颜色，色相偏移由调用方显式给出
#[derive(Debug, Clone)]
pub struct Palette {
  colors: Vec<Rgb<u8>>,
}

impl Default for Palette {
  fn default() -> Self {
    Self::with_hue_offset(0.0)
  }
}

impl Palette {
  pub fn with_hue_offset(offset: f32) -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = ((i as f32 / PALETTE_SIZE as f32) + offset).rem_euclid(1.0) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();
    Self { colors }
  }

  pub fn color(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  palette: Palette,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      palette: Palette::default(),
    }
  }
}

impl Draw {
  pub fn with_palette(mut self, palette: Palette) -> Self {
    self.palette = palette;
    self
  }

  /// 没有字体时只画边框
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    self.font = Some(font);
    Ok(self)
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectionSet) {
    for det in result.iter() {
      self.draw_bbox_with_label(image, det);
    }
  }

  // 坐标已位于原图空间
  fn draw_bbox_with_label(&self, image: &mut RgbImage, det: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let color = self.palette.color(det.class_id);

    let x_min = (det.bbox.x1.floor() as i32).clamp(0, w - 1);
    let y_min = (det.bbox.y1.floor() as i32).clamp(0, h - 1);
    let x_max = (det.bbox.x2.ceil() as i32).clamp(0, w - 1);
    let y_max = (det.bbox.y2.ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.1}%", det.class_name, det.confidence * 100.0);
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, font, &label);
    let label_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签放在边框上方，空间不足时贴住顶部
    let label_x = x_min;
    let label_y = (y_min - label_h).max(0);
    let label_w = (text_w as i32).min(w - label_x);
    if label_w > 0 && label_h > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_w as u32, label_h as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        &label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::BoundingBox;

  fn set(class_id: u32, bbox: BoundingBox) -> DetectionSet {
    DetectionSet::from(vec![Detection {
      class_id,
      class_name: "car".to_string(),
      confidence: 0.8,
      bbox,
    }])
  }

  #[test]
  fn palette_wraps_class_ids() {
    let palette = Palette::default();
    assert_eq!(palette.color(3), palette.color(83));
  }

  #[test]
  fn hue_offset_changes_colors() {
    assert_ne!(
      Palette::with_hue_offset(0.0).color(0),
      Palette::with_hue_offset(0.5).color(0)
    );
  }

  #[test]
  fn box_edges_are_painted() {
    let mut image = RgbImage::new(40, 40);
    let draw = Draw::default();
    draw.draw_detections(&mut image, &set(0, BoundingBox::new(5.0, 5.0, 30.0, 30.0)));
    let color = Palette::default().color(0);
    assert_eq!(image.get_pixel(5, 5), &color);
    assert_eq!(image.get_pixel(15, 5), &color);
    assert_eq!(image.get_pixel(15, 15), &Rgb([0, 0, 0]));
  }

  #[test]
  fn empty_box_draws_nothing() {
    let mut image = RgbImage::new(10, 10);
    Draw::default().draw_detections(&mut image, &set(0, BoundingBox::new(4.0, 4.0, 4.0, 8.0)));
    assert!(image.pixels().all(|p| p == &Rgb([0, 0, 0])));
  }
}
