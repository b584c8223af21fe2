// 该文件是 Xiling （西陵） 项目的一部分。
// src/profile.rs - 模型配置
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::decode::DecoderConfig;
use crate::quant::QuantParams;

const DEFAULT_INPUT_SIDE: u32 = 640;
const DEFAULT_BOX_CONF_THRESHOLD: f32 = 0.25;
const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
const DEFAULT_MAX_DETECTIONS: usize = 64;

#[derive(Error, Debug)]
pub enum ProfileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 预处理时的缩放方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
  /// 先补边为正方形再缩放
  #[default]
  Letterbox,
  /// 直接拉伸到模型输入尺寸
  Stretch,
}

/// 模型配置：锚框、步长、类别数与阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelProfile {
  pub input_width: u32,
  pub input_height: u32,
  #[serde(flatten)]
  pub decoder: DecoderConfig,
  pub resize: ResizeMode,
  pub box_conf_threshold: f32,
  pub nms_threshold: f32,
  pub max_detections: usize,
  /// 每个输出张量的量化参数，运行时无法查询时使用
  pub output_quant: Option<Vec<QuantParams>>,
}

impl Default for ModelProfile {
  fn default() -> Self {
    Self {
      input_width: DEFAULT_INPUT_SIDE,
      input_height: DEFAULT_INPUT_SIDE,
      decoder: DecoderConfig::default(),
      resize: ResizeMode::default(),
      box_conf_threshold: DEFAULT_BOX_CONF_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      max_detections: DEFAULT_MAX_DETECTIONS,
      output_quant: None,
    }
  }
}

impl ModelProfile {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
    let path = path.as_ref();
    info!("加载模型配置: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let profile: ModelProfile = serde_json::from_str(&text)?;
    profile.validate()?;
    debug!("模型配置: {:?}", profile);
    Ok(profile)
  }

  pub fn validate(&self) -> Result<(), ProfileError> {
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ProfileError::Invalid("模型输入尺寸不能为 0".to_string()));
    }
    check_unit_range("box_conf_threshold", self.box_conf_threshold)?;
    check_unit_range("nms_threshold", self.nms_threshold)?;
    if self.max_detections == 0 {
      return Err(ProfileError::Invalid("max_detections 不能为 0".to_string()));
    }
    self.decoder.validate().map_err(ProfileError::Invalid)?;
    if let Some(stride) = self
      .decoder
      .strides
      .iter()
      .find(|&&s| self.input_width % s != 0 || self.input_height % s != 0)
    {
      return Err(ProfileError::Invalid(format!(
        "步长 {} 不能整除模型输入 {}x{}",
        stride, self.input_width, self.input_height
      )));
    }
    if let Some(quant) = &self.output_quant
      && quant.len() != self.decoder.strides.len()
    {
      return Err(ProfileError::Invalid(format!(
        "output_quant 数量 {} 与检测头数量 {} 不一致",
        quant.len(),
        self.decoder.strides.len()
      )));
    }
    Ok(())
  }
}

pub fn check_unit_range(name: &str, value: f32) -> Result<(), ProfileError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ProfileError::Invalid(format!(
      "{} 必须位于 [0, 1] 区间, 实际为 {}",
      name, value
    )))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decode::{BoxEncoding, OutputLayout};

  #[test]
  fn default_profile_is_yolov5s_coco() {
    let profile = ModelProfile::default();
    assert_eq!(profile.input_width, 640);
    assert_eq!(profile.decoder.num_classes, 80);
    assert_eq!(profile.decoder.strides, vec![8, 16, 32]);
    assert_eq!(profile.max_detections, 64);
    assert!(profile.validate().is_ok());
  }

  #[test]
  fn partial_json_falls_back_to_defaults() {
    let profile: ModelProfile = serde_json::from_str(
      r#"{ "input_width": 1280, "input_height": 1280, "num_classes": 10,
           "box_encoding": "yolov5", "output_layout": "nhwc" }"#,
    )
    .unwrap();
    assert_eq!(profile.input_width, 1280);
    assert_eq!(profile.decoder.num_classes, 10);
    assert_eq!(profile.decoder.box_encoding, BoxEncoding::Yolov5);
    assert_eq!(profile.decoder.output_layout, OutputLayout::Nhwc);
    assert_eq!(profile.nms_threshold, 0.45);
    assert_eq!(profile.resize, ResizeMode::Letterbox);
  }

  #[test]
  fn out_of_range_threshold_is_rejected() {
    let profile = ModelProfile {
      box_conf_threshold: 1.5,
      ..Default::default()
    };
    assert!(matches!(profile.validate(), Err(ProfileError::Invalid(_))));
  }

  #[test]
  fn output_quant_must_match_head_count() {
    let profile = ModelProfile {
      output_quant: Some(vec![QuantParams::new(0.1, 0)]),
      ..Default::default()
    };
    assert!(profile.validate().is_err());
  }

  #[test]
  fn input_not_divisible_by_stride_is_rejected() {
    let profile = ModelProfile {
      input_width: 100,
      input_height: 100,
      ..Default::default()
    };
    assert!(matches!(profile.validate(), Err(ProfileError::Invalid(_))));
  }

  #[test]
  fn reads_profile_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    std::fs::write(&path, r#"{ "nms_threshold": 0.6, "resize": "stretch" }"#).unwrap();
    let profile = ModelProfile::from_file(&path).unwrap();
    assert_eq!(profile.nms_threshold, 0.6);
    assert_eq!(profile.resize, ResizeMode::Stretch);
  }
}
