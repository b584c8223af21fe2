// 该文件是 Xiling （西陵） 项目的一部分。
// src/output/json_record.rs - 检测结果 JSON 记录
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

use std::{fs::File, io::BufWriter, path::Path};

use chrono::Utc;
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::{Detection, DetectionSet},
  output::Render,
};

#[derive(Error, Debug)]
pub enum JsonRecordError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct JsonRecord<'a> {
  timestamp: String,
  width: u32,
  height: u32,
  count: usize,
  detections: &'a [Detection],
}

/// `json:///path/result.json`，每次渲染覆盖写入
pub struct JsonRecordOutput {
  path: String,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonRecordError::SchemeMismatch(uri.scheme().to_string()));
    }
    Ok(JsonRecordOutput {
      path: uri.path().to_string(),
    })
  }
}

impl Render<RgbImage, DetectionSet> for JsonRecordOutput {
  type Error = JsonRecordError;

  fn render_result(&self, frame: &RgbImage, result: &DetectionSet) -> Result<(), Self::Error> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let detections: Vec<Detection> = result.iter().cloned().collect();
    let record = JsonRecord {
      timestamp: Utc::now().to_rfc3339(),
      width: frame.width(),
      height: frame.height(),
      count: detections.len(),
      detections: &detections,
    };

    let writer = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer_pretty(writer, &record)?;
    info!("写入 {} 条检测记录到: {}", record.count, self.path);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::BoundingBox;

  #[test]
  fn writes_flat_detection_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result.json");
    let url = Url::parse(&format!("json://{}", path.display())).unwrap();
    let output = JsonRecordOutput::from_url(&url).unwrap();

    let result = DetectionSet::from(vec![Detection {
      class_id: 0,
      class_name: "person".to_string(),
      confidence: 0.5,
      bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
    }]);
    output
      .render_result(&RgbImage::new(16, 9), &result)
      .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["width"], 16);
    assert_eq!(value["height"], 9);
    assert_eq!(value["count"], 1);
    let det = &value["detections"][0];
    assert_eq!(det["class_name"], "person");
    assert_eq!(det["x1"], 1.0);
    assert_eq!(det["y2"], 4.0);
    assert!(value["timestamp"].is_string());
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("image:///tmp/result.json").unwrap();
    assert!(matches!(
      JsonRecordOutput::from_url(&url),
      Err(JsonRecordError::SchemeMismatch(_))
    ));
  }
}
