// 该文件是 Xiling （西陵） 项目的一部分。
// src/pipeline.rs - 单张图像检测流程
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

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  decode::decode,
  detection::DetectionSet,
  error::DetectError,
  frame::RgbFrame,
  labels::Labels,
  letterbox::{letterbox, stretch},
  model::{Engine, EngineOutput},
  nms::{keep_top_k, nms},
  profile::{ModelProfile, ResizeMode},
  remap::{CoordinateTransform, remap},
};

/// 预处理结果：送入模型的帧与还原坐标所需的变换
pub struct Prepared {
  pub frame: RgbFrame,
  pub transform: CoordinateTransform,
  pub original_width: u32,
  pub original_height: u32,
}

/// 补边 → 推理 → 解码 → NMS → 坐标还原
pub struct Pipeline<E> {
  engine: E,
  profile: ModelProfile,
  labels: Labels,
  input_dump: Option<PathBuf>,
}

impl<E: Engine> Pipeline<E> {
  pub fn new(engine: E, profile: ModelProfile, labels: Labels) -> Self {
    if labels.len() < profile.decoder.num_classes {
      warn!(
        "类别名称数量 {} 少于模型类别数 {}",
        labels.len(),
        profile.decoder.num_classes
      );
    }
    Self {
      engine,
      profile,
      labels,
      input_dump: None,
    }
  }

  /// 把送入模型的帧另存为图像，便于检查补边与缩放
  pub fn with_input_dump(mut self, path: Option<PathBuf>) -> Self {
    self.input_dump = path;
    self
  }

  fn dump_input(&self, frame: &RgbFrame) {
    let Some(path) = &self.input_dump else {
      return;
    };
    // 调试输出，失败不影响检测
    match frame.to_rgb_image().save(path) {
      Ok(()) => debug!(
        "预处理输入 {}x{} 已保存到 {}",
        frame.width(),
        frame.height(),
        path.display()
      ),
      Err(e) => warn!("保存预处理输入失败 {}: {}", path.display(), e),
    }
  }

  pub fn preprocess(&self, image: &RgbImage) -> Result<Prepared, DetectError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(DetectError::invalid(format!(
        "图像尺寸为 0: {}x{}",
        width, height
      )));
    }

    let attr = self.engine.input_attr();
    let (model_w, model_h) = (attr.width, attr.height);

    let (resized, transform) = if (width, height) == (model_w, model_h) {
      debug!("图像尺寸与模型输入一致，跳过缩放");
      (image.clone(), CoordinateTransform::identity())
    } else if self.profile.resize == ResizeMode::Letterbox && model_w == model_h {
      let (padded, lb) = letterbox(image, model_w)?;
      (padded, CoordinateTransform::Letterbox(lb))
    } else {
      if self.profile.resize == ResizeMode::Letterbox {
        warn!(
          "模型输入 {}x{} 不是正方形，改为直接拉伸",
          model_w, model_h
        );
      }
      (
        stretch(image, model_w, model_h)?,
        CoordinateTransform::resize(model_w, model_h, width, height),
      )
    };

    let frame = RgbFrame::from_image(&resized, attr.layout);
    self.dump_input(&frame);

    Ok(Prepared {
      frame,
      transform,
      original_width: width,
      original_height: height,
    })
  }

  pub fn postprocess(
    &self,
    output: &EngineOutput,
    prepared: &Prepared,
  ) -> Result<DetectionSet, DetectError> {
    let decoder = &self.profile.decoder;
    let attr = self.engine.input_attr();
    let tensors = output.views(&decoder.strides);
    let candidates = decode(
      &tensors,
      attr.width,
      attr.height,
      self.profile.box_conf_threshold,
      decoder,
    )?;
    debug!("解码得到 {} 个候选框", candidates.len());

    let kept = keep_top_k(
      nms(candidates, self.profile.nms_threshold),
      self.profile.max_detections,
    );

    let items: Vec<_> = kept
      .iter()
      .map(|raw| {
        remap(
          raw,
          &prepared.transform,
          prepared.original_width,
          prepared.original_height,
          &self.labels,
        )
      })
      .collect();

    for det in &items {
      info!(
        "{} @ ({:.0} {:.0} {:.0} {:.0}) {:.3}",
        det.class_name, det.bbox.x1, det.bbox.y1, det.bbox.x2, det.bbox.y2, det.confidence
      );
    }

    Ok(DetectionSet::from(items))
  }

  /// 对一张图像执行完整检测流程，任一步失败都不产生部分结果
  pub fn detect(&self, image: &RgbImage) -> Result<DetectionSet, DetectError> {
    let prepared = self.preprocess(image)?;
    let output = self
      .engine
      .infer(&prepared.frame)
      .map_err(DetectError::inference)?;
    self.postprocess(&output, &prepared)
  }
}
