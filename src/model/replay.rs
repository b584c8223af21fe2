// 该文件是 Xiling （西陵） 项目的一部分。
// src/model/replay.rs - 回放已转储的推理输出
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{InputAttr, RgbFrame},
  model::{Engine, EngineOutput, OutputTensor},
  quant::QuantParams,
};

const REPLAY_META_FILE: &str = "meta.json";

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("描述文件解析错误: {0}")]
  MetaError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("输入大小不匹配: 期望 {expected}, 实际 {actual}")]
  InputMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutputMeta {
  pub file: String,
  #[serde(flatten)]
  pub params: QuantParams,
}

/// 转储目录中的 meta.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMeta {
  pub input: InputAttr,
  pub outputs: Vec<ReplayOutputMeta>,
}

/// 从目录读取 int8 输出并在每次推理时原样返回，无需硬件
pub struct ReplayEngine {
  input: InputAttr,
  output: EngineOutput,
}

pub struct ReplayEngineBuilder {
  directory: PathBuf,
}

impl FromUrlWithScheme for ReplayEngineBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngineBuilder {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(ReplayEngineBuilder {
      directory: PathBuf::from(url.path()),
    })
  }
}

impl ReplayEngineBuilder {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn build(self) -> Result<ReplayEngine, ReplayError> {
    info!("加载回放目录: {}", self.directory.display());
    let meta_text = std::fs::read_to_string(self.directory.join(REPLAY_META_FILE))?;
    let meta: ReplayMeta = serde_json::from_str(&meta_text)?;
    debug!(
      "输入: {:?} {}x{}",
      meta.input.layout, meta.input.width, meta.input.height
    );

    let mut tensors = Vec::with_capacity(meta.outputs.len());
    for (i, out) in meta.outputs.iter().enumerate() {
      let bytes = std::fs::read(self.directory.join(&out.file))?;
      debug!(
        "输出 {}: {} 字节, scale={}, zp={}",
        i,
        bytes.len(),
        out.params.scale,
        out.params.zero_point
      );
      tensors.push(OutputTensor {
        data: bytemuck::cast_slice::<u8, i8>(&bytes).to_vec(),
        params: out.params,
      });
    }
    info!("回放引擎就绪: {} 个输出", tensors.len());

    Ok(ReplayEngine {
      input: meta.input,
      output: EngineOutput { tensors },
    })
  }
}

impl ReplayEngine {
  /// 把一次推理结果转储为回放目录
  pub fn dump(
    directory: impl AsRef<Path>,
    input: InputAttr,
    output: &EngineOutput,
  ) -> Result<(), ReplayError> {
    let directory = directory.as_ref();
    std::fs::create_dir_all(directory)?;

    let mut outputs = Vec::with_capacity(output.len());
    for (i, tensor) in output.tensors.iter().enumerate() {
      let file = format!("output{}.bin", i);
      std::fs::write(
        directory.join(&file),
        bytemuck::cast_slice::<i8, u8>(&tensor.data),
      )?;
      outputs.push(ReplayOutputMeta {
        file,
        params: tensor.params,
      });
    }

    let meta = ReplayMeta { input, outputs };
    std::fs::write(
      directory.join(REPLAY_META_FILE),
      serde_json::to_string_pretty(&meta)?,
    )?;
    info!("推理输出已转储到 {}", directory.display());
    Ok(())
  }
}

impl Engine for ReplayEngine {
  type Error = ReplayError;

  fn input_attr(&self) -> InputAttr {
    self.input
  }

  fn infer(&self, frame: &RgbFrame) -> Result<EngineOutput, Self::Error> {
    let expected = self.input.size();
    let actual = frame.as_bytes().len();
    if expected != actual {
      return Err(ReplayError::InputMismatch { expected, actual });
    }
    debug!("回放推理输出");
    Ok(self.output.clone())
  }
}
