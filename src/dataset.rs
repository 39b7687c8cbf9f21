// 该文件是 Guance （观测） 项目的一部分。
// src/dataset.rs - 验证数据集
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

use crate::model::RawDetections;

/// 一个图像批次及其可选的真值标注
#[derive(Debug, Clone, Default)]
pub struct Batch {
  pub images: Vec<RgbImage>,
  pub ground_truth: Option<RawDetections>,
}

impl Batch {
  pub fn new(images: Vec<RgbImage>) -> Self {
    Self {
      images,
      ground_truth: None,
    }
  }

  pub fn with_ground_truth(mut self, ground_truth: RawDetections) -> Self {
    self.ground_truth = Some(ground_truth);
    self
  }

  pub fn len(&self) -> usize {
    self.images.len()
  }

  pub fn is_empty(&self) -> bool {
    self.images.is_empty()
  }
}

/// 有限、可重复遍历的批次序列
///
/// 每次调用 `batches` 都从头开始；数据集本身只读，可在多次观测间共享。
pub trait Dataset {
  fn batches(&self) -> impl Iterator<Item = &Batch> + '_;
}

/// 预先载入内存的数据集
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
  batches: Vec<Batch>,
}

impl InMemoryDataset {
  pub fn new(batches: Vec<Batch>) -> Self {
    Self { batches }
  }

  /// 将图像按 `batch_size` 切分为批次，最后一个批次可能不满
  pub fn from_images(images: Vec<RgbImage>, batch_size: usize) -> Self {
    let batch_size = batch_size.max(1);
    let batches = images
      .chunks(batch_size)
      .map(|chunk| Batch::new(chunk.to_vec()))
      .collect();
    Self { batches }
  }

  pub fn len(&self) -> usize {
    self.batches.len()
  }

  pub fn is_empty(&self) -> bool {
    self.batches.is_empty()
  }
}

impl Dataset for InMemoryDataset {
  fn batches(&self) -> impl Iterator<Item = &Batch> + '_ {
    self.batches.iter()
  }
}

impl<D: Dataset> Dataset for &D {
  fn batches(&self) -> impl Iterator<Item = &Batch> + '_ {
    (**self).batches()
  }
}

#[cfg(feature = "read_image_file")]
mod image_directory;
#[cfg(feature = "read_image_file")]
pub use self::image_directory::{ImageDirectoryDataset, ImageDirectoryError};
