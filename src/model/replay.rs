// 该文件是 Guance （观测） 项目的一部分。
// src/model/replay.rs - 回放录制的预测头输出
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

use std::{cell::Cell, sync::Arc};

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::{BoxFormat, UnknownBoxFormat},
  decoder::MultiClassNms,
  model::{Model, RawImageOutput, RawModelOutput, SharedDecoder},
};

// 模型自带解码策略的默认阈值
const REPLAY_DEFAULT_IOU_THRESHOLD: f32 = 0.5;
const REPLAY_DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error(transparent)]
  BoxFormat(#[from] UnknownBoxFormat),
  #[error("回放记录为空")]
  Empty,
}

/// 一张图像的录制输出
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRecord {
  pub boxes: Vec<[f32; 4]>,
  pub class_scores: Vec<Vec<f32>>,
}

/// 按顺序循环回放录制输出的模型
///
/// 每次前向推理为批次中的每张图像取下一条记录，图像尺寸取自输入批次。
#[derive(Debug)]
pub struct ReplayModel {
  records: Vec<ReplayRecord>,
  cursor: Cell<usize>,
  decoder: SharedDecoder,
}

impl ReplayModel {
  pub fn new(records: Vec<ReplayRecord>, format: BoxFormat) -> Result<Self, ReplayError> {
    if records.is_empty() {
      return Err(ReplayError::Empty);
    }
    let decoder = MultiClassNms::new(
      format,
      REPLAY_DEFAULT_IOU_THRESHOLD,
      REPLAY_DEFAULT_CONFIDENCE_THRESHOLD,
    );
    Ok(Self {
      records,
      cursor: Cell::new(0),
      decoder: Arc::new(decoder),
    })
  }

  pub fn from_json_str(json: &str, format: BoxFormat) -> Result<Self, ReplayError> {
    let records: Vec<ReplayRecord> = serde_json::from_str(json)?;
    Self::new(records, format)
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  fn next_record(&self) -> &ReplayRecord {
    let cursor = self.cursor.get();
    self.cursor.set((cursor + 1) % self.records.len());
    &self.records[cursor]
  }
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut format = BoxFormat::default();
    for (k, v) in url.query_pairs() {
      if k == "format" {
        format = v.parse()?;
      }
    }

    info!("加载回放记录: {}", url.path());
    let json = std::fs::read_to_string(url.path())?;
    let model = Self::from_json_str(&json, format)?;
    debug!("回放记录数量: {}, 边界框格式: {}", model.len(), format);
    Ok(model)
  }
}

impl Model for ReplayModel {
  type Error = ReplayError;

  fn forward(&self, images: &[RgbImage]) -> Result<RawModelOutput, Self::Error> {
    let images = images
      .iter()
      .map(|image| {
        let record = self.next_record();
        RawImageOutput {
          width: image.width(),
          height: image.height(),
          boxes: record.boxes.clone(),
          class_scores: record.class_scores.clone(),
        }
      })
      .collect();
    Ok(RawModelOutput { images })
  }

  fn decoder(&self) -> SharedDecoder {
    Arc::clone(&self.decoder)
  }

  fn replace_decoder(&mut self, decoder: SharedDecoder) -> SharedDecoder {
    std::mem::replace(&mut self.decoder, decoder)
  }
}
