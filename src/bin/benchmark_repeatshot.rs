// 该文件是 Xiling （西陵） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理耗时统计
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use xiling::{
  FromUrl,
  args::DetectArgs,
  input::InputWrapper,
  model::load_engine,
  output::OutputWrapper,
  pipeline::Pipeline,
  task::{RepeatShotTask, Task},
};

/// Xiling 重复推理测试
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub detect: DetectArgs,
  /// 重复次数，前两次作为预热不计入平均
  #[arg(long, default_value = "1000", value_name = "COUNT")]
  pub times: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let Args { detect: args, times } = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("重复次数: {}", times);

  let profile = args.load_profile()?;
  let labels = args.load_labels()?;

  let input = InputWrapper::from_url(&args.input)?;
  let engine = load_engine(&args.model, &profile)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let pipeline =
    Pipeline::new(engine, profile, labels).with_input_dump(args.dump_input.clone());
  RepeatShotTask::default()
    .with_repeat_times(times)
    .run_task(input, &pipeline, output)?;

  Ok(())
}
