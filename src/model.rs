// 该文件是 Guance （观测） 项目的一部分。
// src/model.rs - 模型与解码策略
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

use std::{fmt::Debug, ops::Deref, sync::Arc};

use image::RgbImage;
use tracing::debug;

use crate::{decoder::DecodeError, error::Error};

/// 单个检测结果，bbox 保持模型的源格式
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: [f32; 4],
  pub class_id: u32,
  pub confidence: f32,
}

/// 单张图像的解码结果
///
/// `items` 按置信度降序排列，长度不超过解码器容量；
/// `survivors` 为截断前通过阈值与抑制的检测数量。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageDetections {
  pub items: Vec<Detection>,
  pub survivors: usize,
}

impl ImageDetections {
  pub fn num_detections(&self) -> usize {
    self.items.len()
  }

  pub fn is_truncated(&self) -> bool {
    self.survivors > self.items.len()
  }

  pub fn confidences(&self) -> Vec<f32> {
    self.items.iter().map(|item| item.confidence).collect()
  }

  pub fn classes(&self) -> Vec<u32> {
    self.items.iter().map(|item| item.class_id).collect()
  }
}

impl From<Vec<Detection>> for ImageDetections {
  fn from(items: Vec<Detection>) -> Self {
    let survivors = items.len();
    Self { items, survivors }
  }
}

/// 一个批次的解码结果，每张图像一项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
  pub images: Vec<ImageDetections>,
}

impl RawDetections {
  pub fn total_detections(&self) -> usize {
    self.images.iter().map(ImageDetections::num_detections).sum()
  }
}

/// 单张图像的预测头原始输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawImageOutput {
  pub width: u32,
  pub height: u32,
  /// 每个候选框的坐标，源格式
  pub boxes: Vec<[f32; 4]>,
  /// 每个候选框的逐类别分数（logits 或概率）
  pub class_scores: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawModelOutput {
  pub images: Vec<RawImageOutput>,
}

/// 将原始输出解码为离散检测结果的策略
pub trait Decoder: Debug {
  fn decode(&self, output: &RawModelOutput) -> Result<RawDetections, DecodeError>;
}

pub type SharedDecoder = Arc<dyn Decoder + Send + Sync>;

/// 检测模型
///
/// 当前解码策略是模型上唯一可变的共享状态，同一时刻只允许一个写者。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn forward(&self, images: &[RgbImage]) -> Result<RawModelOutput, Self::Error>;

  fn decoder(&self) -> SharedDecoder;

  /// 替换当前解码策略，返回被替换的策略
  fn replace_decoder(&mut self, decoder: SharedDecoder) -> SharedDecoder;

  fn predict(&self, images: &[RgbImage]) -> Result<RawDetections, Error> {
    let output = self.forward(images).map_err(Error::model)?;
    let detections = self.decoder().decode(&output)?;
    debug!(
      "批次推理完成: {} 张图像, {} 个检测",
      detections.images.len(),
      detections.total_detections()
    );
    Ok(detections)
  }
}

/// 临时替换模型的解码策略，离开作用域时无条件恢复原策略
pub struct DecoderGuard<'m, M: Model> {
  model: &'m mut M,
  previous: Option<SharedDecoder>,
}

impl<'m, M: Model> DecoderGuard<'m, M> {
  pub fn swap_in(model: &'m mut M, decoder: SharedDecoder) -> Self {
    let previous = model.replace_decoder(decoder);
    debug!("替换解码策略: {:?}", previous);
    Self {
      model,
      previous: Some(previous),
    }
  }
}

impl<M: Model> Deref for DecoderGuard<'_, M> {
  type Target = M;

  fn deref(&self) -> &Self::Target {
    self.model
  }
}

impl<M: Model> Drop for DecoderGuard<'_, M> {
  fn drop(&mut self) {
    if let Some(previous) = self.previous.take() {
      debug!("恢复解码策略: {:?}", previous);
      self.model.replace_decoder(previous);
    }
  }
}

mod replay;
pub use self::replay::{ReplayError, ReplayModel, ReplayRecord};
