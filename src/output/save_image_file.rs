// 该文件是 Xiling （西陵） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
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

use image::RgbImage;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::DetectionSet,
  output::{
    Render,
    draw::{Draw, Palette},
  },
};

pub struct SaveImageFileOutput {
  path: String,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("字体加载错误: {0}")]
  FontError(std::io::Error),
  #[error("无效的色相偏移: {0}")]
  InvalidHue(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  /// `image:///path/out.jpg?font=/path/font.ttf&hue=0.3`
  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut draw = Draw::default();
    for (key, value) in uri.query_pairs() {
      match key.as_ref() {
        "font" => {
          draw = draw
            .with_font_file(value.as_ref())
            .map_err(SaveImageFileError::FontError)?;
        }
        "hue" => {
          let offset: f32 = value
            .parse()
            .map_err(|_| SaveImageFileError::InvalidHue(value.to_string()))?;
          draw = draw.with_palette(Palette::with_hue_offset(offset));
        }
        other => warn!("忽略未知参数: {}", other),
      }
    }

    Ok(SaveImageFileOutput {
      path: uri.path().to_string(),
      draw,
    })
  }
}

impl SaveImageFileOutput {
  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    warn!("保存图像到文件: {}", self.path);

    Ok(())
  }
}

impl Render<RgbImage, DetectionSet> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbImage, result: &DetectionSet) -> Result<(), Self::Error> {
    let mut image = frame.clone();
    self.draw.draw_detections(&mut image, result);
    self.save_image(image)
  }
}
