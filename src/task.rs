// 该文件是 Xiling （西陵） 项目的一部分。
// src/task.rs - 检测任务
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

use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{info, warn};

use crate::{detection::DetectionSet, model::Engine, output::Render, pipeline::Pipeline};

// 预热轮次不计入平均耗时
const WARMUP_RUNS: usize = 2;

pub trait Task<I, E, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: &Pipeline<E>, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  E: Engine,
  O: Render<RgbImage, DetectionSet, Error = RE>,
> Task<I, E, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, pipeline: &Pipeline<E>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = pipeline.detect(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，检测到 {} 个目标，耗时: {:.2?}", result.len(), elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一张图像重复检测，统计平均耗时
pub struct RepeatShotTask {
  repeat_times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat_times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times.max(1);
    self
  }

  pub fn repeat_times(&self) -> usize {
    self.repeat_times
  }
}

/// 去掉预热轮次后的平均耗时，轮次不足时返回 None
pub fn average_after_warmup(times: &[Duration]) -> Option<Duration> {
  let measured = times.get(WARMUP_RUNS..)?;
  if measured.is_empty() {
    return None;
  }
  Some(measured.iter().sum::<Duration>() / measured.len() as u32)
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  E: Engine,
  O: Render<RgbImage, DetectionSet, Error = RE>,
> Task<I, E, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, pipeline: &Pipeline<E>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat_times);
    let mut last = DetectionSet::default();
    for i in 0..self.repeat_times {
      let now = Instant::now();
      last = pipeline.detect(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
    }
    output.render_result(&frame, &last)?;

    match average_after_warmup(&times) {
      Some(avg) => warn!("平均推理时间: {:.2?}", avg),
      None => warn!("运行次数不足 {}，不统计平均推理时间", WARMUP_RUNS + 1),
    }

    Ok(())
  }
}
