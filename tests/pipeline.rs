// 该文件是 Xiling （西陵） 项目的一部分。
// tests/pipeline.rs - 检测流程集成测试
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

use image::RgbImage;
use url::Url;

use xiling::{
  DetectError, FromUrl,
  decode::{BoxEncoding, DecoderConfig, OutputLayout},
  detection::BoundingBox,
  frame::{InputAttr, RgbFrame, TensorLayout},
  labels::Labels,
  model::{Engine, EngineOutput, OutputTensor, ReplayEngine, load_engine},
  output::{OutputWrapper, Render},
  pipeline::Pipeline,
  profile::{ModelProfile, ResizeMode},
  quant::QuantParams,
};

const SIDE: u32 = 64;
const STRIDE: u32 = 32;
const GRID: usize = (SIDE / STRIDE) as usize;
const PROP: usize = 5 + 2;
const HIGH: i8 = 100;
const LOW: i8 = -100;

/// 64x64 输入，单个步长 32 的检测头，一个 32x32 锚框，两个类别
fn profile() -> ModelProfile {
  ModelProfile {
    input_width: SIDE,
    input_height: SIDE,
    decoder: DecoderConfig {
      num_classes: 2,
      strides: vec![STRIDE],
      anchors: vec![vec![[32.0, 32.0]]],
      output_layout: OutputLayout::Nchw,
      box_encoding: BoxEncoding::Exponential,
    },
    ..ModelProfile::default()
  }
}

fn labels() -> Labels {
  Labels::parse("cat\ndog\n")
}

fn offset(row: usize, col: usize, k: usize) -> usize {
  k * GRID * GRID + row * GRID + col
}

/// 所有网格默认被过滤，按 (row, col, class) 点亮若干个中心落在格子中央的框
fn head(cells: &[(usize, usize, usize)]) -> Vec<i8> {
  let mut data = vec![0i8; PROP * GRID * GRID];
  for row in 0..GRID {
    for col in 0..GRID {
      data[offset(row, col, 4)] = LOW;
      data[offset(row, col, 5)] = LOW;
      data[offset(row, col, 6)] = LOW;
    }
  }
  for &(row, col, class) in cells {
    data[offset(row, col, 4)] = HIGH;
    data[offset(row, col, 5 + class)] = HIGH;
  }
  data
}

fn output(data: Vec<i8>) -> EngineOutput {
  EngineOutput {
    tensors: vec![OutputTensor {
      data,
      params: QuantParams::new(1.0, 0),
    }],
  }
}

fn attr() -> InputAttr {
  InputAttr {
    layout: TensorLayout::Nhwc,
    width: SIDE,
    height: SIDE,
  }
}

struct FixedEngine {
  output: EngineOutput,
}

impl Engine for FixedEngine {
  type Error = std::io::Error;

  fn input_attr(&self) -> InputAttr {
    attr()
  }

  fn infer(&self, frame: &RgbFrame) -> Result<EngineOutput, Self::Error> {
    assert_eq!(frame.as_bytes().len(), attr().size());
    Ok(self.output.clone())
  }
}

struct FailingEngine;

impl Engine for FailingEngine {
  type Error = std::io::Error;

  fn input_attr(&self) -> InputAttr {
    attr()
  }

  fn infer(&self, _frame: &RgbFrame) -> Result<EngineOutput, Self::Error> {
    Err(std::io::Error::other("npu busy"))
  }
}

fn pipeline(data: Vec<i8>) -> Pipeline<FixedEngine> {
  Pipeline::new(
    FixedEngine {
      output: output(data),
    },
    profile(),
    labels(),
  )
}

#[test]
fn letterboxed_detections_map_back_to_original() {
  // 128x64 补边到 128x128，上方补 32 行，gain = 2
  let set = pipeline(head(&[(0, 0, 1), (1, 1, 0)]))
    .detect(&RgbImage::new(128, 64))
    .unwrap();

  assert_eq!(set.len(), 2);
  let items: Vec<_> = set.iter().collect();
  assert_eq!(items[0].class_id, 0);
  assert_eq!(items[0].class_name, "cat");
  assert_eq!(items[0].bbox, BoundingBox::new(64.0, 32.0, 128.0, 64.0));
  assert_eq!(items[1].class_id, 1);
  assert_eq!(items[1].class_name, "dog");
  assert_eq!(items[1].bbox, BoundingBox::new(0.0, 0.0, 64.0, 32.0));
  assert_eq!(items[1].confidence, 1.0);
}

#[test]
fn stretch_mode_scales_each_axis() {
  let mut profile = profile();
  profile.resize = ResizeMode::Stretch;
  let pipeline = Pipeline::new(
    FixedEngine {
      output: output(head(&[(0, 0, 1)])),
    },
    profile,
    labels(),
  );

  let set = pipeline.detect(&RgbImage::new(128, 64)).unwrap();
  assert_eq!(set.len(), 1);
  assert_eq!(
    set.iter().next().map(|d| d.bbox),
    Some(BoundingBox::new(0.0, 0.0, 64.0, 32.0))
  );
}

#[test]
fn image_matching_model_input_is_not_transformed() {
  let set = pipeline(head(&[(1, 0, 0)]))
    .detect(&RgbImage::new(SIDE, SIDE))
    .unwrap();
  assert_eq!(
    set.iter().next().map(|d| d.bbox),
    Some(BoundingBox::new(0.0, 32.0, 32.0, 64.0))
  );
}

#[test]
fn nothing_above_threshold_gives_empty_set() {
  let set = pipeline(head(&[])).detect(&RgbImage::new(100, 80)).unwrap();
  assert!(set.is_empty());
}

#[test]
fn confidence_equal_to_threshold_is_kept() {
  let mut profile = profile();
  profile.box_conf_threshold = 1.0;
  let pipeline = Pipeline::new(
    FixedEngine {
      output: output(head(&[(0, 1, 0)])),
    },
    profile,
    labels(),
  );
  assert_eq!(pipeline.detect(&RgbImage::new(64, 64)).unwrap().len(), 1);
}

#[test]
fn survivors_are_capped() {
  let mut profile = profile();
  profile.max_detections = 1;
  let pipeline = Pipeline::new(
    FixedEngine {
      output: output(head(&[(0, 0, 0), (1, 1, 1)])),
    },
    profile,
    labels(),
  );
  assert_eq!(pipeline.detect(&RgbImage::new(64, 64)).unwrap().len(), 1);
}

#[test]
fn preprocessed_input_is_dumped_when_requested() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("resize_input.png");
  let pipeline = pipeline(head(&[])).with_input_dump(Some(path.clone()));

  let white = RgbImage::from_pixel(128, 64, image::Rgb([255, 255, 255]));
  pipeline.detect(&white).unwrap();

  let dumped = image::open(&path).unwrap().to_rgb8();
  assert_eq!(dumped.dimensions(), (SIDE, SIDE));
  assert_eq!(dumped.get_pixel(32, 0), &image::Rgb([0, 0, 0]));
  assert_eq!(dumped.get_pixel(32, 32), &image::Rgb([255, 255, 255]));
}

#[test]
fn empty_image_is_invalid_input() {
  let err = pipeline(head(&[])).detect(&RgbImage::new(0, 0)).unwrap_err();
  assert!(matches!(err, DetectError::InvalidInput(_)));
}

#[test]
fn wrong_tensor_count_is_shape_mismatch() {
  let mut out = output(head(&[]));
  out.tensors.push(out.tensors[0].clone());
  let pipeline = Pipeline::new(FixedEngine { output: out }, profile(), labels());
  let err = pipeline.detect(&RgbImage::new(64, 64)).unwrap_err();
  assert!(matches!(
    err,
    DetectError::TensorShapeMismatch {
      index: 1,
      expected: 1,
      actual: 2,
    }
  ));
}

#[test]
fn wrong_tensor_length_is_shape_mismatch() {
  let err = pipeline(vec![0i8; 10])
    .detect(&RgbImage::new(64, 64))
    .unwrap_err();
  assert!(matches!(
    err,
    DetectError::TensorShapeMismatch {
      index: 0,
      expected: 28,
      actual: 10,
    }
  ));
}

#[test]
fn engine_failure_is_inference_error() {
  let pipeline = Pipeline::new(FailingEngine, profile(), labels());
  let err = pipeline.detect(&RgbImage::new(64, 64)).unwrap_err();
  assert!(matches!(err, DetectError::Inference(_)));
}

#[test]
fn unknown_model_scheme_is_model_load_error() {
  let url = Url::parse("onnx:///tmp/model.onnx").unwrap();
  assert!(matches!(
    load_engine(&url, &profile()),
    Err(DetectError::ModelLoad(_))
  ));
}

#[test]
fn replay_dump_runs_end_to_end() {
  let dir = tempfile::tempdir().unwrap();
  let dump = dir.path().join("dump");
  ReplayEngine::dump(&dump, attr(), &output(head(&[(0, 0, 1)]))).unwrap();

  let url = Url::parse(&format!("replay://{}", dump.display())).unwrap();
  let engine = load_engine(&url, &profile()).unwrap();
  let pipeline = Pipeline::new(engine, profile(), labels());
  let image = RgbImage::new(128, 64);
  let set = pipeline.detect(&image).unwrap();
  assert_eq!(set.len(), 1);

  let json = dir.path().join("out.json");
  let sink = OutputWrapper::from_url(&Url::parse(&format!("json://{}", json.display())).unwrap())
    .unwrap();
  sink.render_result(&image, &set).unwrap();

  let value: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
  assert_eq!(value["count"], 1);
  assert_eq!(value["detections"][0]["class_name"], "dog");
  assert_eq!(value["detections"][0]["x2"], 64.0);
}
