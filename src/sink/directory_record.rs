// 该文件是 Guance （观测） 项目的一部分。
// src/sink/directory_record.rs - 目录记录输出
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

use std::{cell::Cell, path::PathBuf};

use chrono::{Datelike, Utc};
use image::RgbImage;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  sink::{Artifact, Sink},
  table::{AnnotatedImage, VisualizationTable},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordSinkError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("未启用 draw_boxes 特性，无法绘制预测框")]
  DrawUnavailable,
}

/// 按日期分目录记录产物
///
/// 表格写为 `<目录>/<年>/<月>/<日>/<名称>.json`，每行图像写入同名子目录，
/// 单独记录的图像写为 `<名称>-<时分秒>-<序号>.png`。
/// URL 形如 `folder:///runs/vis?draw`。
pub struct DirectoryRecordSink {
  directory: PathBuf,
  draw: bool,
  image_counter: Cell<u16>,
}

impl DirectoryRecordSink {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      draw: false,
      image_counter: Cell::new(0),
    }
  }

  pub fn with_draw(mut self, draw: bool) -> Self {
    self.draw = draw;
    self
  }

  fn dated_directory(&self) -> Result<PathBuf, DirectoryRecordSinkError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }
    Ok(directory)
  }

  fn next_image_id(&self) -> u16 {
    let id = self.image_counter.get().wrapping_add(1);
    self.image_counter.set(id);
    id
  }

  fn render(&self, image: &AnnotatedImage) -> Result<RgbImage, DirectoryRecordSinkError> {
    if !self.draw {
      return Ok(image.image.clone());
    }
    draw_boxes(image)
  }

  fn record_table(
    &self,
    name: &str,
    table: &VisualizationTable,
  ) -> Result<(), DirectoryRecordSinkError> {
    let directory = self.dated_directory()?;
    let stem = file_stem(name);
    let image_directory = directory.join(&stem);
    std::fs::create_dir_all(&image_directory)?;

    let mut json = serde_json::to_value(table)?;
    for (index, row) in table.rows().iter().enumerate() {
      let file_name = format!("{:04}-epoch{}.png", index, row.epoch);
      self.render(&row.image)?.save(image_directory.join(&file_name))?;
      if let Some(Value::Object(image)) = json
        .get_mut("data")
        .and_then(|data| data.get_mut(index))
        .and_then(|row| row.get_mut(1))
      {
        image.insert(
          "path".to_string(),
          Value::String(format!("{}/{}", stem, file_name)),
        );
      }
    }
    debug!("写入 {} 张图像到 {}", table.len(), image_directory.display());

    let path = directory.join(format!("{}.json", stem));
    std::fs::write(&path, serde_json::to_string_pretty(&json)?)?;
    warn!("保存表格到文件: {}", path.display());
    Ok(())
  }

  fn record_image(&self, name: &str, image: &AnnotatedImage) -> Result<(), DirectoryRecordSinkError> {
    let directory = self.dated_directory()?;
    let path = directory.join(format!(
      "{}-{}-{:04X}.png",
      file_stem(name),
      Utc::now().format("%H-%M-%S"),
      self.next_image_id()
    ));
    self.render(image)?.save(&path)?;
    info!("保存图像到文件: {}", path.display());
    Ok(())
  }
}

#[cfg(feature = "draw_boxes")]
fn draw_boxes(image: &AnnotatedImage) -> Result<RgbImage, DirectoryRecordSinkError> {
  Ok(crate::sink::draw::draw_annotations(image))
}

#[cfg(not(feature = "draw_boxes"))]
fn draw_boxes(_image: &AnnotatedImage) -> Result<RgbImage, DirectoryRecordSinkError> {
  Err(DirectoryRecordSinkError::DrawUnavailable)
}

/// 产物名称中不适合作为文件名的字符替换为 `_`
fn file_stem(name: &str) -> String {
  let stem: String = name
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '-' || c == '_' {
        c
      } else {
        '_'
      }
    })
    .collect();
  if stem.is_empty() {
    "artifact".to_string()
  } else {
    stem
  }
}

impl FromUrlWithScheme for DirectoryRecordSink {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordSink {
  type Error = DirectoryRecordSinkError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordSinkError::SchemeMismatch);
    }

    let draw = uri.query_pairs().any(|(k, _)| k == "draw");
    if draw && cfg!(not(feature = "draw_boxes")) {
      return Err(DirectoryRecordSinkError::DrawUnavailable);
    }

    Ok(DirectoryRecordSink::new(uri.path()).with_draw(draw))
  }
}

impl Sink for DirectoryRecordSink {
  type Error = DirectoryRecordSinkError;

  fn log(&self, name: &str, artifact: Artifact<'_>) -> Result<(), Self::Error> {
    match artifact {
      Artifact::Table(table) => self.record_table(name, table),
      Artifact::Image(image) => self.record_image(name, image),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::{
    aggregate::{MeanConfidenceRow, mean_confidence_per_class},
    label::ClassMapping,
    table::TableRow,
  };

  fn find_files(root: &std::path::Path, extension: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          pending.push(path);
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
          found.push(path);
        }
      }
    }
    found
  }

  fn annotated() -> AnnotatedImage {
    AnnotatedImage {
      image: RgbImage::new(8, 8),
      boxes: Vec::new(),
      class_labels: Arc::new(ClassMapping::new().with_label(0, "cat")),
    }
  }

  #[test]
  fn records_table_json_and_row_images() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DirectoryRecordSink::new(dir.path());

    let pets: ClassMapping = [(0, "cat"), (1, "dog")].into_iter().collect();
    let mut table = VisualizationTable::new("Evaluation Table");
    table.append(vec![
      TableRow {
        epoch: 0,
        image: annotated(),
        mean_confidence: MeanConfidenceRow::default(),
      },
      TableRow {
        epoch: 1,
        image: annotated(),
        mean_confidence: mean_confidence_per_class(&[0.5, 0.25], &[1, 0], &pets).unwrap(),
      },
    ]);
    sink.log(table.title(), Artifact::Table(&table)).unwrap();

    let json_files = find_files(dir.path(), "json");
    assert_eq!(json_files.len(), 1);
    assert!(json_files[0].ends_with("Evaluation_Table.json"));
    assert_eq!(find_files(dir.path(), "png").len(), 2);

    let json: Value = serde_json::from_str(&std::fs::read_to_string(&json_files[0]).unwrap()).unwrap();
    assert_eq!(json["data"][1][1]["path"], "Evaluation_Table/0001-epoch1.png");
    let cell = json["data"][1][2].as_object().unwrap();
    assert_eq!(
      cell.keys().map(String::as_str).collect::<Vec<_>>(),
      vec!["dog", "cat"]
    );
  }

  #[test]
  fn records_standalone_images() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let sink = DirectoryRecordSink::from_url(&url).unwrap();

    sink.log("sample", Artifact::Image(&annotated())).unwrap();
    sink.log("sample", Artifact::Image(&annotated())).unwrap();
    assert_eq!(find_files(dir.path(), "png").len(), 2);
  }

  #[test]
  fn file_stem_replaces_separators() {
    assert_eq!(file_stem("a/b c"), "a_b_c");
    assert_eq!(file_stem(""), "artifact");
  }
}
