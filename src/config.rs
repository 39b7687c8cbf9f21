// 该文件是 Guance （观测） 项目的一部分。
// src/config.rs - 可视化配置
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

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::{BoxFormat, UnknownBoxFormat},
  callback::DetectionVisualizer,
  dataset::Dataset,
  decoder::{DEFAULT_MAX_DETECTIONS, MultiClassNms},
  label::ClassMapping,
  sink::Sink,
};

pub const DEFAULT_MAX_BATCHES: usize = 1;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.01;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.01;
pub const DEFAULT_TITLE: &str = "Evaluation-Table";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("{name} 必须在 [0, 1] 之间, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("每次观测至少需要 1 个批次")]
  NoBatches,
  #[error("每张图像至少保留 1 个检测")]
  NoCapacity,
  #[error("表格标题不能为空")]
  EmptyTitle,
  #[error("参数 {0} 的值无效: {1}")]
  InvalidValue(String, String),
  #[error(transparent)]
  BoxFormat(#[from] UnknownBoxFormat),
}

/// 可视化回调的构造参数，构造后不可修改
///
/// 也可以从 URL 构造:
/// `detvis:?batches=2&iou=0.45&confidence=0.25&format=center_xywh&title=Val&max_detections=50`
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizerBuilder {
  max_batches: usize,
  iou_threshold: f32,
  confidence_threshold: f32,
  format: BoxFormat,
  title: String,
  max_detections: usize,
}

impl Default for VisualizerBuilder {
  fn default() -> Self {
    Self {
      max_batches: DEFAULT_MAX_BATCHES,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      format: BoxFormat::Xywh,
      title: DEFAULT_TITLE.to_string(),
      max_detections: DEFAULT_MAX_DETECTIONS,
    }
  }
}

impl VisualizerBuilder {
  pub fn max_batches(mut self, max_batches: usize) -> Self {
    self.max_batches = max_batches;
    self
  }

  pub fn iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn confidence_threshold(mut self, confidence_threshold: f32) -> Self {
    self.confidence_threshold = confidence_threshold;
    self
  }

  pub fn format(mut self, format: BoxFormat) -> Self {
    self.format = format;
    self
  }

  pub fn title(mut self, title: impl Into<String>) -> Self {
    self.title = title.into();
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("iou_threshold", self.iou_threshold),
      ("confidence_threshold", self.confidence_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        error!("{} 超出范围: {}", name, value);
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }
    if self.max_batches == 0 {
      return Err(ConfigError::NoBatches);
    }
    if self.max_detections == 0 {
      return Err(ConfigError::NoCapacity);
    }
    if self.title.trim().is_empty() {
      return Err(ConfigError::EmptyTitle);
    }
    Ok(())
  }

  pub fn build<D: Dataset, S: Sink>(
    self,
    dataset: D,
    class_mapping: ClassMapping,
    sink: S,
  ) -> Result<DetectionVisualizer<D, S>, ConfigError> {
    self.validate()?;

    info!(
      "创建可视化回调: 表格 '{}', 每轮 {} 个批次, 格式 {}",
      self.title, self.max_batches, self.format
    );
    debug!(
      "IoU 阈值 {}, 置信度阈值 {}, 每图最多 {} 个检测, 类别数 {}",
      self.iou_threshold,
      self.confidence_threshold,
      self.max_detections,
      class_mapping.len()
    );

    let decoder = MultiClassNms::new(self.format, self.iou_threshold, self.confidence_threshold)
      .with_max_detections(self.max_detections);

    Ok(DetectionVisualizer::new(
      dataset,
      Arc::new(class_mapping),
      sink,
      Arc::new(decoder),
      self.format,
      self.max_batches,
      self.title,
    ))
  }
}

impl FromUrlWithScheme for VisualizerBuilder {
  const SCHEME: &'static str = "detvis";
}

impl FromUrl for VisualizerBuilder {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConfigError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut builder = VisualizerBuilder::default();
    for (k, v) in url.query_pairs() {
      let invalid = || ConfigError::InvalidValue(k.to_string(), v.to_string());
      builder = match &*k {
        "batches" => builder.max_batches(v.parse().map_err(|_| invalid())?),
        "iou" => builder.iou_threshold(v.parse().map_err(|_| invalid())?),
        "confidence" => builder.confidence_threshold(v.parse().map_err(|_| invalid())?),
        "format" => builder.format(v.parse()?),
        "title" => builder.title(v.to_string()),
        "max_detections" => builder.max_detections(v.parse().map_err(|_| invalid())?),
        _ => {
          debug!("忽略未知参数: {}={}", k, v);
          builder
        }
      };
    }

    builder.validate()?;
    Ok(builder)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let builder = VisualizerBuilder::default();
    assert!(builder.validate().is_ok());
    assert_eq!(builder.format, BoxFormat::Xywh);
    assert_eq!(builder.title, "Evaluation-Table");
  }

  #[test]
  fn parses_url_query() {
    let url =
      Url::parse("detvis:?batches=3&iou=0.45&confidence=0.25&format=center_xywh&title=Val%20Set")
        .unwrap();
    let builder = VisualizerBuilder::from_url(&url).unwrap();

    assert_eq!(
      builder,
      VisualizerBuilder::default()
        .max_batches(3)
        .iou_threshold(0.45)
        .confidence_threshold(0.25)
        .format(BoxFormat::CenterXywh)
        .title("Val Set")
    );
  }

  #[test]
  fn rejects_invalid_values() {
    let parse = |s: &str| VisualizerBuilder::from_url(&Url::parse(s).unwrap());

    assert!(matches!(
      parse("detvis:?iou=1.5"),
      Err(ConfigError::ThresholdOutOfRange {
        name: "iou_threshold",
        ..
      })
    ));
    assert!(matches!(parse("detvis:?batches=0"), Err(ConfigError::NoBatches)));
    assert!(matches!(
      parse("detvis:?batches=two"),
      Err(ConfigError::InvalidValue(_, _))
    ));
    assert!(matches!(
      parse("detvis:?format=polygon"),
      Err(ConfigError::BoxFormat(_))
    ));
    assert!(matches!(
      parse("config:?batches=1"),
      Err(ConfigError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn nan_threshold_is_rejected() {
    assert!(matches!(
      VisualizerBuilder::default()
        .confidence_threshold(f32::NAN)
        .validate(),
      Err(ConfigError::ThresholdOutOfRange { .. })
    ));
  }
}
