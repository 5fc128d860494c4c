// 该文件是 Ringsight （寻环） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use crate::model::DetectItem;

/// 按类别的非极大值抑制
///
/// 返回按置信度降序排列、最多 `max_det` 个结果。同分时保持输入顺序。
pub fn nms(mut detections: Vec<DetectItem>, iou_threshold: f32, max_det: usize) -> Vec<DetectItem> {
  // 按置信度降序排序
  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::new();

  for det in detections {
    if result.len() >= max_det {
      break;
    }

    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == det.class_id && iou(&kept.bbox, &det.bbox) > iou_threshold);
    if !suppressed {
      result.push(det);
    }
  }

  result
}

/// 计算两个 xyxy 边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn iou_of_disjoint_and_identical() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert!((iou(&a, &[5.0, 0.0, 15.0, 10.0]) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn suppresses_overlap_within_class() {
    let kept = nms(
      vec![
        item(0, 0.6, [0.5, 0.5, 10.5, 10.5]),
        item(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
        item(0, 0.5, [50.0, 50.0, 60.0, 60.0]),
      ],
      0.7,
      300,
    );

    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].score, 0.5);
  }

  #[test]
  fn keeps_overlap_across_classes() {
    let kept = nms(
      vec![
        item(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
        item(1, 0.8, [0.0, 0.0, 10.0, 10.0]),
      ],
      0.7,
      300,
    );
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn limits_to_max_det() {
    let detections = (0..10)
      .map(|i| item(0, i as f32 / 10.0, [i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0]))
      .collect();
    let kept = nms(detections, 0.7, 3);
    assert_eq!(kept.len(), 3);
    assert_eq!(kept[0].score, 0.9);
  }

  #[test]
  fn equal_scores_keep_input_order() {
    let kept = nms(
      vec![
        item(0, 0.5, [0.0, 0.0, 10.0, 10.0]),
        item(0, 0.5, [100.0, 0.0, 110.0, 10.0]),
      ],
      0.7,
      300,
    );
    assert_eq!(kept[0].bbox[0], 0.0);
    assert_eq!(kept[1].bbox[0], 100.0);
  }
}
