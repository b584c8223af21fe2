// 该文件是 Xiling （西陵） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Args;
use tracing::info;
use url::Url;

use crate::{
  labels::Labels,
  profile::{ModelProfile, ProfileError, check_unit_range},
};

/// 检测程序共用参数
#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
  /// 模型地址，例如 rknn:///path/model.rknn 或 replay:///path/dump
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///path/in.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///path/out.jpg 或 json:///path/out.json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 模型配置 JSON 文件，缺省为 YOLOv5s/COCO
  #[arg(long, value_name = "FILE")]
  pub profile: Option<PathBuf>,
  /// 类别名称文件，每行一个，缺省为 COCO-80
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 置信度阈值 (0.0 - 1.0)，缺省 0.25
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IoU 阈值 (0.0 - 1.0)，缺省 0.45
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,
  /// 最多保留的检测数量，缺省 64
  #[arg(long, value_name = "COUNT")]
  pub max_detections: Option<usize>,
  /// 把补边缩放后的模型输入另存为图像，用于调试
  #[arg(long, value_name = "FILE")]
  pub dump_input: Option<PathBuf>,
}

impl DetectArgs {
  /// 读取模型配置，命令行阈值覆盖配置文件
  pub fn load_profile(&self) -> Result<ModelProfile, ProfileError> {
    let mut profile = match &self.profile {
      Some(path) => ModelProfile::from_file(path)?,
      None => ModelProfile::default(),
    };
    if let Some(confidence) = self.confidence {
      check_unit_range("confidence", confidence)?;
      profile.box_conf_threshold = confidence;
    }
    if let Some(nms_threshold) = self.nms_threshold {
      check_unit_range("nms-threshold", nms_threshold)?;
      profile.nms_threshold = nms_threshold;
    }
    if let Some(max_detections) = self.max_detections {
      profile.max_detections = max_detections;
    }
    profile.validate()?;
    info!(
      "置信度阈值: {}, NMS 阈值: {}, 最大检测数: {}",
      profile.box_conf_threshold, profile.nms_threshold, profile.max_detections
    );
    Ok(profile)
  }

  pub fn load_labels(&self) -> Result<Labels, std::io::Error> {
    match &self.labels {
      Some(path) => Labels::from_file(path),
      None => Ok(Labels::coco()),
    }
  }
}
