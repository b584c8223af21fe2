// 该文件是 Xiling （西陵） 项目的一部分。
// src/model/rknn.rs - RKNPU 推理引擎
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{InputAttr, RgbFrame, TensorLayout},
  model::{Engine, EngineOutput, OutputTensor},
  profile::ModelProfile,
  quant::QuantParams,
};

const RKNN_NUM_INPUTS: u32 = 1;

#[derive(Error, Debug)]
pub enum RknnError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("缺少输出量化参数，请在模型配置中提供 output_quant")]
  MissingQuantParams,
}

impl RknnError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnError::ModelInvalid(msg.to_string(), e)
  }
}

/// 运行在 RKNPU 上的检测模型
///
/// 运行时按浮点取回输出，再用配置中的量化参数还原为 int8，
/// 后续解码与硬件直接输出 int8 时完全一致。
pub struct RknnEngine {
  context: Context,
  input: InputAttr,
  output_quant: Vec<QuantParams>,
}

pub struct RknnEngineBuilder {
  model_path: String,
  input: Option<InputAttr>,
  output_quant: Option<Vec<QuantParams>>,
}

impl FromUrlWithScheme for RknnEngineBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnEngineBuilder {
  type Error = RknnError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let layout = match url.query_pairs().find(|(k, _)| k == "layout") {
      Some((_, v)) if v == "nchw" => TensorLayout::Nchw,
      _ => TensorLayout::Nhwc,
    };

    Ok(RknnEngineBuilder {
      model_path: url.path().to_string(),
      input: Some(InputAttr {
        layout,
        width: 0,
        height: 0,
      }),
      output_quant: None,
    })
  }
}

impl RknnEngineBuilder {
  pub fn profile(mut self, profile: &ModelProfile) -> Self {
    let layout = self.input.map(|i| i.layout).unwrap_or_default();
    self.input = Some(InputAttr {
      layout,
      width: profile.input_width,
      height: profile.input_height,
    });
    self.output_quant = profile.output_quant.clone();
    self
  }

  pub fn build(self) -> Result<RknnEngine, RknnError> {
    let output_quant = self.output_quant.ok_or(RknnError::MissingQuantParams)?;
    let input = self
      .input
      .filter(|i| i.width > 0 && i.height > 0)
      .ok_or_else(|| RknnError::ModelPathError("缺少模型输入尺寸".to_string()))?;

    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, InitFlags::default())?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(RknnError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnError::invalid("无法获取输出数量", e))?;
    debug!("模型输入数量: {}, 输出数量: {}", num_inputs, num_outputs);

    if num_inputs != RKNN_NUM_INPUTS {
      let msg = format!(
        "预期模型输入数量为 {}, 实际为 {}",
        RKNN_NUM_INPUTS, num_inputs
      );
      error!("{}", msg);
      return Err(RknnError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    if num_outputs as usize != output_quant.len() {
      let msg = format!(
        "预期模型输出数量为 {}, 实际为 {}",
        output_quant.len(),
        num_outputs
      );
      error!("{}", msg);
      return Err(RknnError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    // 绑定层不提供张量属性查询，输入尺寸与量化参数取自模型配置
    warn!(
      "输入 {:?} {}x{} 与 {} 组输出量化参数来自模型配置，请确认与模型一致",
      input.layout,
      input.width,
      input.height,
      output_quant.len()
    );
    for (idx, params) in output_quant.iter().enumerate() {
      debug!(
        "输出 {}: scale={}, zp={}",
        idx, params.scale, params.zero_point
      );
    }

    info!("模型加载完成");
    Ok(RknnEngine {
      context,
      input,
      output_quant,
    })
  }
}

impl Engine for RknnEngine {
  type Error = RknnError;

  fn input_attr(&self) -> InputAttr {
    self.input
  }

  fn infer(&self, frame: &RgbFrame) -> Result<EngineOutput, Self::Error> {
    let format = match frame.layout() {
      TensorLayout::Nhwc => TensorFormat::NHWC,
      TensorLayout::Nchw => TensorFormat::NCHW,
    };

    debug!("设置模型输入");
    self
      .context
      .set_input(0, frame.as_bytes(), format, TensorType::UInt8)?;

    debug!("执行模型推理");
    self.context.run()?;

    debug!("获取模型输出");
    let output = self.context.get_outputs()?;

    let mut tensors = Vec::with_capacity(self.output_quant.len());
    for (idx, params) in self.output_quant.iter().enumerate() {
      let values = output.get_f32(idx)?;
      tensors.push(OutputTensor {
        data: values.iter().map(|&v| params.quantize(v)).collect(),
        params: *params,
      });
    }

    Ok(EngineOutput { tensors })
  }
}
