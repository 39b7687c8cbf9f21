// 该文件是 Guance （观测） 项目的一部分。
// src/decoder.rs - 多类别非极大值抑制解码
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
use tracing::{debug, warn};

use crate::{
  bbox::{BoxFormat, iou},
  model::{Decoder, Detection, ImageDetections, RawDetections, RawImageOutput, RawModelOutput},
};

/// 每张图像保留的最大检测数量
pub const DEFAULT_MAX_DETECTIONS: usize = 100;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("第 {image} 张图像有 {boxes} 个边界框，但有 {scores} 组类别分数")]
  ShapeMismatch {
    image: usize,
    boxes: usize,
    scores: usize,
  },
  #[error("第 {image} 张图像第 {index} 个边界框有 {found} 个类别分数，期望 {expected} 个")]
  ClassCountMismatch {
    image: usize,
    index: usize,
    expected: usize,
    found: usize,
  },
  #[error("第 {image} 张图像尺寸无效: {width}x{height}")]
  InvalidImage {
    image: usize,
    width: u32,
    height: u32,
  },
}

/// 逐类别的非极大值抑制
///
/// 同一边界框可以在多个类别下各自保留。
#[derive(Debug, Clone, PartialEq)]
pub struct MultiClassNms {
  format: BoxFormat,
  iou_threshold: f32,
  confidence_threshold: f32,
  from_logits: bool,
  max_detections: usize,
}

impl MultiClassNms {
  pub fn new(format: BoxFormat, iou_threshold: f32, confidence_threshold: f32) -> Self {
    Self {
      format,
      iou_threshold,
      confidence_threshold,
      from_logits: true,
      max_detections: DEFAULT_MAX_DETECTIONS,
    }
  }

  pub fn with_from_logits(mut self, from_logits: bool) -> Self {
    self.from_logits = from_logits;
    self
  }

  pub fn with_max_detections(mut self, max_detections: usize) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn format(&self) -> BoxFormat {
    self.format
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn max_detections(&self) -> usize {
    self.max_detections
  }

  fn score(&self, raw: f32) -> f32 {
    if self.from_logits { sigmoid(raw) } else { raw }
  }

  fn decode_image(
    &self,
    index: usize,
    output: &RawImageOutput,
  ) -> Result<ImageDetections, DecodeError> {
    if output.boxes.len() != output.class_scores.len() {
      return Err(DecodeError::ShapeMismatch {
        image: index,
        boxes: output.boxes.len(),
        scores: output.class_scores.len(),
      });
    }
    if output.boxes.is_empty() {
      return Ok(ImageDetections::default());
    }
    if self.format.is_relative() && (output.width == 0 || output.height == 0) {
      return Err(DecodeError::InvalidImage {
        image: index,
        width: output.width,
        height: output.height,
      });
    }

    let num_classes = output.class_scores[0].len();
    if let Some((box_index, scores)) = output
      .class_scores
      .iter()
      .enumerate()
      .find(|(_, scores)| scores.len() != num_classes)
    {
      return Err(DecodeError::ClassCountMismatch {
        image: index,
        index: box_index,
        expected: num_classes,
        found: scores.len(),
      });
    }

    // 抑制在像素坐标下进行
    let (width, height) = (output.width as f32, output.height as f32);
    let corners: Vec<[f32; 4]> = output
      .boxes
      .iter()
      .map(|bbox| self.format.to_xyxy(*bbox, width, height))
      .collect();

    let mut survivors = Vec::new();
    for class_id in 0..num_classes {
      let mut candidates: Vec<(usize, f32)> = output
        .class_scores
        .iter()
        .enumerate()
        .map(|(box_index, scores)| (box_index, self.score(scores[class_id])))
        .filter(|(_, score)| *score >= self.confidence_threshold)
        .collect();
      candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

      let mut kept: Vec<usize> = Vec::new();
      for (box_index, score) in candidates {
        let suppressed = kept
          .iter()
          .any(|&k| iou(&corners[k], &corners[box_index]) > self.iou_threshold);
        if suppressed {
          continue;
        }
        kept.push(box_index);
        survivors.push(Detection {
          bbox: output.boxes[box_index],
          class_id: class_id as u32,
          confidence: score,
        });
      }
    }

    survivors.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let count = survivors.len();
    if count > self.max_detections {
      warn!(
        "第 {} 张图像有 {} 个检测，截断到 {} 个",
        index, count, self.max_detections
      );
      survivors.truncate(self.max_detections);
    }

    Ok(ImageDetections {
      items: survivors,
      survivors: count,
    })
  }
}

impl Default for MultiClassNms {
  fn default() -> Self {
    Self::new(BoxFormat::default(), 0.5, 0.5)
  }
}

impl Decoder for MultiClassNms {
  fn decode(&self, output: &RawModelOutput) -> Result<RawDetections, DecodeError> {
    let images = output
      .images
      .iter()
      .enumerate()
      .map(|(index, image)| self.decode_image(index, image))
      .collect::<Result<Vec<_>, _>>()?;

    debug!(
      "解码 {} 张图像, IoU 阈值 {}, 置信度阈值 {}",
      images.len(),
      self.iou_threshold,
      self.confidence_threshold
    );
    Ok(RawDetections { images })
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn image(boxes: Vec<[f32; 4]>, class_scores: Vec<Vec<f32>>) -> RawModelOutput {
    RawModelOutput {
      images: vec![RawImageOutput {
        width: 100,
        height: 100,
        boxes,
        class_scores,
      }],
    }
  }

  fn probabilities(format: BoxFormat, iou: f32, confidence: f32) -> MultiClassNms {
    MultiClassNms::new(format, iou, confidence).with_from_logits(false)
  }

  #[test]
  fn suppresses_overlapping_boxes_of_same_class() {
    let output = image(
      vec![
        [10.0, 10.0, 50.0, 50.0],
        [12.0, 12.0, 50.0, 50.0],
        [60.0, 60.0, 90.0, 90.0],
      ],
      vec![vec![0.8], vec![0.9], vec![0.7]],
    );
    let decoded = probabilities(BoxFormat::Xyxy, 0.5, 0.1)
      .decode(&output)
      .unwrap();

    let items = &decoded.images[0].items;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].bbox, [12.0, 12.0, 50.0, 50.0]);
    assert_eq!(items[1].bbox, [60.0, 60.0, 90.0, 90.0]);
    assert_eq!(decoded.images[0].survivors, 2);
  }

  #[test]
  fn keeps_overlapping_boxes_of_different_classes() {
    let output = image(
      vec![[10.0, 10.0, 50.0, 50.0], [10.0, 10.0, 50.0, 50.0]],
      vec![vec![0.9, 0.0], vec![0.0, 0.8]],
    );
    let decoded = probabilities(BoxFormat::Xyxy, 0.5, 0.1)
      .decode(&output)
      .unwrap();

    let classes = decoded.images[0].classes();
    assert_eq!(classes, vec![0, 1]);
  }

  #[test]
  fn drops_boxes_below_confidence_threshold() {
    let output = image(
      vec![[0.0, 0.0, 10.0, 10.0], [50.0, 50.0, 10.0, 10.0]],
      vec![vec![0.2], vec![0.6]],
    );
    let decoded = probabilities(BoxFormat::Xywh, 0.5, 0.5)
      .decode(&output)
      .unwrap();

    assert_eq!(decoded.images[0].confidences(), vec![0.6]);
  }

  #[test]
  fn applies_sigmoid_to_logits() {
    let output = image(vec![[0.0, 0.0, 10.0, 10.0]], vec![vec![0.0]]);
    let decoded = MultiClassNms::new(BoxFormat::Xyxy, 0.5, 0.4)
      .decode(&output)
      .unwrap();

    assert!((decoded.images[0].items[0].confidence - 0.5).abs() < 1e-6);
  }

  #[test]
  fn truncates_to_capacity_and_reports_true_count() {
    let boxes = (0..5)
      .map(|i| [i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0])
      .collect();
    let scores = (0..5).map(|i| vec![0.5 + i as f32 * 0.1]).collect();
    let decoded = probabilities(BoxFormat::Xyxy, 0.5, 0.1)
      .with_max_detections(2)
      .decode(&image(boxes, scores))
      .unwrap();

    let result = &decoded.images[0];
    assert_eq!(result.num_detections(), 2);
    assert_eq!(result.survivors, 5);
    assert!(result.is_truncated());
    assert!(result.items[0].confidence > result.items[1].confidence);
  }

  #[test]
  fn rejects_misaligned_scores() {
    let output = image(vec![[0.0; 4], [0.0; 4]], vec![vec![0.5]]);
    assert!(matches!(
      MultiClassNms::default().decode(&output),
      Err(DecodeError::ShapeMismatch { boxes: 2, scores: 1, .. })
    ));

    let output = image(vec![[0.0; 4], [0.0; 4]], vec![vec![0.5], vec![0.5, 0.1]]);
    assert!(matches!(
      MultiClassNms::default().decode(&output),
      Err(DecodeError::ClassCountMismatch { index: 1, .. })
    ));
  }

  #[test]
  fn relative_format_needs_image_size() {
    let mut output = image(vec![[0.1, 0.1, 0.2, 0.2]], vec![vec![0.9]]);
    output.images[0].width = 0;
    assert!(matches!(
      probabilities(BoxFormat::RelXyxy, 0.5, 0.1).decode(&output),
      Err(DecodeError::InvalidImage { width: 0, .. })
    ));
  }
}
