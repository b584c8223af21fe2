// 该文件是 Xiling （西陵） 项目的一部分。
// src/error.rs - 流水线错误定义
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

use thiserror::Error;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 单张图像检测流程中可能出现的错误
#[derive(Error, Debug)]
pub enum DetectError {
  #[error("输入无效: {0}")]
  InvalidInput(String),
  #[error("输出张量 {index} 形状不匹配: 期望 {expected} 个元素, 实际 {actual} 个")]
  TensorShapeMismatch {
    index: usize,
    expected: usize,
    actual: usize,
  },
  #[error("模型加载错误: {0}")]
  ModelLoad(#[source] BoxedError),
  #[error("推理错误: {0}")]
  Inference(#[source] BoxedError),
}

impl DetectError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    DetectError::InvalidInput(msg.into())
  }

  pub fn model_load<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    DetectError::ModelLoad(Box::new(err))
  }

  pub fn inference<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    DetectError::Inference(Box::new(err))
  }
}
