// 该文件是 Guance （观测） 项目的一部分。
// src/dataset/image_directory.rs - 图像目录数据集
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  dataset::{Batch, Dataset, InMemoryDataset},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageDirectoryError {
  #[error("URI schema mismatch: {0}")]
  SchemaMismatch(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Invalid query parameter {0}={1}")]
  InvalidQuery(String, String),
  #[error("No image found under {0}")]
  Empty(PathBuf),
}

/// 从单个图像文件或目录载入的数据集
///
/// 图像在构造时全部解码进内存，按文件名排序。
/// URL 形如 `image:///data/val?batch=4&limit=16`。
#[derive(Debug, Clone)]
pub struct ImageDirectoryDataset {
  inner: InMemoryDataset,
}

impl ImageDirectoryDataset {
  pub fn open(
    path: impl AsRef<Path>,
    batch_size: usize,
    limit: Option<usize>,
  ) -> Result<Self, ImageDirectoryError> {
    let path = path.as_ref();
    let mut files = if path.is_dir() {
      let mut files = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image_file(p))
        .collect::<Vec<_>>();
      files.sort();
      files
    } else {
      vec![path.to_path_buf()]
    };
    if let Some(limit) = limit {
      files.truncate(limit);
    }
    if files.is_empty() {
      return Err(ImageDirectoryError::Empty(path.to_path_buf()));
    }

    let images = files
      .iter()
      .map(|file| -> Result<RgbImage, ImageDirectoryError> {
        debug!("读取图像: {}", file.display());
        Ok(ImageReader::open(file)?.decode()?.into_rgb8())
      })
      .collect::<Result<Vec<_>, _>>()?;

    info!(
      "载入 {} 张图像, 批次大小 {}",
      images.len(),
      batch_size.max(1)
    );
    Ok(Self {
      inner: InMemoryDataset::from_images(images, batch_size),
    })
  }

  pub fn len(&self) -> usize {
    self.inner.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    .unwrap_or(false)
}

impl FromUrlWithScheme for ImageDirectoryDataset {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageDirectoryDataset {
  type Error = ImageDirectoryError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageDirectoryError::SchemaMismatch(url.scheme().to_string()));
    }

    let mut batch_size = 1;
    let mut limit = None;
    for (k, v) in url.query_pairs() {
      let parse = || {
        v.parse::<usize>()
          .map_err(|_| ImageDirectoryError::InvalidQuery(k.to_string(), v.to_string()))
      };
      match &*k {
        "batch" => batch_size = parse()?,
        "limit" => limit = Some(parse()?),
        _ => {}
      }
    }

    Self::open(url.path(), batch_size, limit)
  }
}

impl Dataset for ImageDirectoryDataset {
  fn batches(&self) -> impl Iterator<Item = &Batch> + '_ {
    self.inner.batches()
  }
}
