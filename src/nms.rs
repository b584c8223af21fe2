// 该文件是 Xiling （西陵） 项目的一部分。
// src/nms.rs - 按类别的非极大值抑制
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

use std::collections::BTreeMap;

use tracing::debug;

use crate::detection::{BoundingBox, RawDetection};

/// 计算两个边界框的 IoU，面积为 0 的框与任何框的 IoU 都为 0
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
  let area_a = a.area();
  let area_b = b.area();
  if area_a <= 0.0 || area_b <= 0.0 {
    return 0.0;
  }

  let x1 = a.x1.max(b.x1);
  let y1 = a.y1.max(b.y1);
  let x2 = a.x2.min(b.x2);
  let y2 = a.y2.min(b.y2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别分组执行贪心 NMS
///
/// 每个类别内按置信度降序（稳定排序，同分保持解码顺序）依次选出最优框，
/// 并移除与之 IoU 大于 `iou_threshold` 的同类框。
/// 输出按类别序号升序，类内保持选出顺序。
pub fn nms(detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
  let total = detections.len();

  let mut by_class: BTreeMap<u32, Vec<RawDetection>> = BTreeMap::new();
  for det in detections {
    by_class.entry(det.class_id).or_default().push(det);
  }

  let mut result = Vec::with_capacity(total);
  for (class_id, mut candidates) in by_class {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut active = vec![true; candidates.len()];
    let before = result.len();
    for i in 0..candidates.len() {
      if !active[i] {
        continue;
      }
      for j in (i + 1)..candidates.len() {
        if active[j] && iou(&candidates[i].bbox, &candidates[j].bbox) > iou_threshold {
          active[j] = false;
        }
      }
    }
    result.extend(
      candidates
        .into_iter()
        .zip(active)
        .filter_map(|(det, keep)| keep.then_some(det)),
    );
    debug!("类别 {}: 保留 {} 个检测框", class_id, result.len() - before);
  }

  debug!("NMS: {} -> {}", total, result.len());
  result
}

/// 只保留置信度最高的 `k` 个检测，保持原有相对顺序
pub fn keep_top_k(detections: Vec<RawDetection>, k: usize) -> Vec<RawDetection> {
  if detections.len() <= k {
    return detections;
  }

  let mut ranked: Vec<usize> = (0..detections.len()).collect();
  ranked.sort_by(|&a, &b| {
    detections[b]
      .confidence
      .total_cmp(&detections[a].confidence)
  });
  let mut keep = vec![false; detections.len()];
  for &i in ranked.iter().take(k) {
    keep[i] = true;
  }

  debug!("检测数量 {} 超过上限 {}, 截断", detections.len(), k);
  detections
    .into_iter()
    .zip(keep)
    .filter_map(|(det, keep)| keep.then_some(det))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(class_id: u32, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
    RawDetection {
      bbox: BoundingBox::new(x1, y1, x2, y2),
      class_id,
      confidence,
    }
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(iou(&b, &b), 1.0);
  }

  #[test]
  fn iou_is_symmetric_and_bounded() {
    let boxes = [
      BoundingBox::new(0.0, 0.0, 10.0, 10.0),
      BoundingBox::new(5.0, 5.0, 15.0, 15.0),
      BoundingBox::new(20.0, 20.0, 30.0, 40.0),
      BoundingBox::new(-5.0, 2.0, 7.0, 3.0),
      BoundingBox::new(1.0, 1.0, 1.0, 9.0),
    ];
    for a in &boxes {
      for b in &boxes {
        let ab = iou(a, b);
        assert_eq!(ab, iou(b, a));
        assert!((0.0..=1.0).contains(&ab));
      }
    }
    // 交集 25，并集 175
    assert_eq!(iou(&boxes[0], &boxes[1]), 25.0 / 175.0);
  }

  #[test]
  fn degenerate_box_never_overlaps() {
    let line = BoundingBox::new(0.0, 0.0, 0.0, 10.0);
    let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(iou(&line, &b), 0.0);
    assert_eq!(iou(&line, &line), 0.0);
  }

  #[test]
  fn empty_input_gives_empty_output() {
    assert!(nms(Vec::new(), 0.45).is_empty());
  }

  #[test]
  fn overlapping_duplicates_collapse_to_best() {
    let input = vec![
      det(0, 0.6, 0.0, 0.0, 10.0, 10.0),
      det(0, 0.9, 1.0, 1.0, 11.0, 11.0),
      det(0, 0.7, 50.0, 50.0, 60.0, 60.0),
    ];
    let out = nms(input, 0.45);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].confidence, 0.9);
    assert_eq!(out[1].confidence, 0.7);
  }

  #[test]
  fn different_classes_do_not_suppress_each_other() {
    let input = vec![
      det(3, 0.8, 0.0, 0.0, 10.0, 10.0),
      det(1, 0.7, 0.0, 0.0, 10.0, 10.0),
    ];
    let out = nms(input, 0.1);
    let classes: Vec<u32> = out.iter().map(|d| d.class_id).collect();
    assert_eq!(classes, vec![1, 3]);
  }

  #[test]
  fn zero_threshold_keeps_only_disjoint_boxes() {
    let input = vec![
      det(0, 0.5, 0.0, 0.0, 10.0, 10.0),
      det(0, 0.9, 9.0, 9.0, 20.0, 20.0),
      det(0, 0.8, 100.0, 100.0, 110.0, 110.0),
    ];
    let out = nms(input, 0.0);
    let confidences: Vec<f32> = out.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.9, 0.8]);
  }

  #[test]
  fn ties_keep_decode_order() {
    let input = vec![
      det(0, 0.5, 0.0, 0.0, 10.0, 10.0),
      det(0, 0.5, 1.0, 0.0, 11.0, 10.0),
    ];
    let out = nms(input, 0.45);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].bbox.x1, 0.0);
  }

  #[test]
  fn nms_never_grows_the_set() {
    let input: Vec<RawDetection> = (0..20)
      .map(|i| {
        let o = (i % 7) as f32 * 3.0;
        det(i % 3, 0.1 + i as f32 * 0.01, o, o, o + 8.0, o + 8.0)
      })
      .collect();
    for t in [0.0f32, 0.2, 0.5, 0.8, 1.0] {
      assert!(nms(input.clone(), t).len() <= input.len());
    }
    assert_eq!(nms(input.clone(), 1.0).len(), input.len());
  }

  #[test]
  fn top_k_keeps_most_confident_in_place() {
    let input = vec![
      det(0, 0.3, 0.0, 0.0, 1.0, 1.0),
      det(0, 0.9, 0.0, 0.0, 1.0, 1.0),
      det(1, 0.5, 0.0, 0.0, 1.0, 1.0),
      det(2, 0.7, 0.0, 0.0, 1.0, 1.0),
    ];
    let out = keep_top_k(input, 2);
    let confidences: Vec<f32> = out.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.9, 0.7]);
  }
}
