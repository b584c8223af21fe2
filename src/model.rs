// 该文件是 Xiling （西陵） 项目的一部分。
// src/model.rs - 推理引擎抽象
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
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::DetectError,
  frame::{InputAttr, RgbFrame},
  profile::ModelProfile,
  quant::{QuantParams, QuantizedTensor},
};

/// 推理引擎：接收排布好的 uint8 输入，返回 int8 量化输出
pub trait Engine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn input_attr(&self) -> InputAttr;
  fn infer(&self, frame: &RgbFrame) -> Result<EngineOutput, Self::Error>;
}

/// 单个 int8 输出张量及其量化参数
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  pub data: Vec<i8>,
  pub params: QuantParams,
}

/// 一次推理的全部输出，由引擎侧持有
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
  pub tensors: Vec<OutputTensor>,
}

impl EngineOutput {
  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }

  /// 按输出顺序为每个张量配上步长，得到只读视图
  ///
  /// 多出的张量步长记为 0，交给解码阶段报告数量不符。
  pub fn views<'a>(&'a self, strides: &[u32]) -> Vec<QuantizedTensor<'a>> {
    self
      .tensors
      .iter()
      .enumerate()
      .map(|(i, t)| {
        let stride = strides.get(i).copied().unwrap_or(0);
        QuantizedTensor::new(&t.data, stride, t.params)
      })
      .collect()
  }
}

mod replay;
pub use self::replay::{ReplayEngine, ReplayEngineBuilder, ReplayError, ReplayMeta};

#[cfg(feature = "rknpu")]
mod rknn;
#[cfg(feature = "rknpu")]
pub use self::rknn::{RknnEngine, RknnEngineBuilder, RknnError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("回放引擎错误: {0}")]
  ReplayError(#[from] ReplayError),
  #[cfg(feature = "rknpu")]
  #[error("RKNN 引擎错误: {0}")]
  RknnError(#[from] RknnError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum ModelWrapperBuilder {
  Replay(ReplayEngineBuilder),
  #[cfg(feature = "rknpu")]
  Rknn(RknnEngineBuilder),
}

impl FromUrl for ModelWrapperBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayEngineBuilder::SCHEME => Ok(ModelWrapperBuilder::Replay(
        ReplayEngineBuilder::from_url(url)?,
      )),
      #[cfg(feature = "rknpu")]
      RknnEngineBuilder::SCHEME => Ok(ModelWrapperBuilder::Rknn(RknnEngineBuilder::from_url(
        url,
      )?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl ModelWrapperBuilder {
  #[allow(unused_variables)]
  pub fn build(self, profile: &ModelProfile) -> Result<ModelWrapper, ModelError> {
    match self {
      ModelWrapperBuilder::Replay(builder) => Ok(ModelWrapper::Replay(builder.build()?)),
      #[cfg(feature = "rknpu")]
      ModelWrapperBuilder::Rknn(builder) => {
        Ok(ModelWrapper::Rknn(builder.profile(profile).build()?))
      }
    }
  }
}

pub enum ModelWrapper {
  Replay(ReplayEngine),
  #[cfg(feature = "rknpu")]
  Rknn(RknnEngine),
}

impl Engine for ModelWrapper {
  type Error = ModelError;

  fn input_attr(&self) -> InputAttr {
    match self {
      ModelWrapper::Replay(engine) => engine.input_attr(),
      #[cfg(feature = "rknpu")]
      ModelWrapper::Rknn(engine) => engine.input_attr(),
    }
  }

  fn infer(&self, frame: &RgbFrame) -> Result<EngineOutput, Self::Error> {
    match self {
      ModelWrapper::Replay(engine) => engine.infer(frame).map_err(ModelError::from),
      #[cfg(feature = "rknpu")]
      ModelWrapper::Rknn(engine) => engine.infer(frame).map_err(ModelError::from),
    }
  }
}

/// 按 URL 加载推理引擎，加载失败原样包装为 `ModelLoad`
pub fn load_engine(url: &Url, profile: &ModelProfile) -> Result<ModelWrapper, DetectError> {
  ModelWrapperBuilder::from_url(url)
    .and_then(|builder| builder.build(profile))
    .map_err(DetectError::model_load)
}
