// 该文件是 Guance （观测） 项目的一部分。
// src/sink/memory.rs - 内存日志输出
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

use std::cell::RefCell;

use serde_json::Value;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  sink::{Artifact, Sink, SinkError},
};

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedArtifact {
  pub name: String,
  pub kind: &'static str,
  /// 表格的行数，图像为 `None`
  pub rows: Option<usize>,
  pub payload: Value,
}

/// 将产物序列化后保存在内存中
#[derive(Debug, Default)]
pub struct MemorySink {
  logged: RefCell<Vec<LoggedArtifact>>,
}

impl MemorySink {
  pub fn entries(&self) -> Vec<LoggedArtifact> {
    self.logged.borrow().clone()
  }

  pub fn len(&self) -> usize {
    self.logged.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.logged.borrow().is_empty()
  }
}

impl FromUrlWithScheme for MemorySink {
  const SCHEME: &'static str = "memory";
}

impl FromUrl for MemorySink {
  type Error = SinkError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SinkError::SchemeMismatch);
    }
    Ok(Self::default())
  }
}

impl Sink for MemorySink {
  type Error = serde_json::Error;

  fn log(&self, name: &str, artifact: Artifact<'_>) -> Result<(), Self::Error> {
    let (rows, payload) = match artifact {
      Artifact::Table(table) => (Some(table.len()), serde_json::to_value(table)?),
      Artifact::Image(image) => (None, serde_json::to_value(image)?),
    };

    info!("记录 {} {}", artifact.kind(), name);
    self.logged.borrow_mut().push(LoggedArtifact {
      name: name.to_string(),
      kind: artifact.kind(),
      rows,
      payload,
    });
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use image::RgbImage;

  use super::*;
  use crate::{
    aggregate::mean_confidence_per_class,
    label::ClassMapping,
    table::{AnnotatedImage, TableRow, VisualizationTable},
  };

  #[test]
  fn table_payload_keeps_mean_confidence_order() {
    let mapping: Arc<ClassMapping> = Arc::new([(0, "cat"), (1, "dog")].into_iter().collect());
    let mut table = VisualizationTable::new("Evaluation-Table");
    table.append(vec![TableRow {
      epoch: 0,
      image: AnnotatedImage {
        image: RgbImage::new(4, 4),
        boxes: Vec::new(),
        class_labels: Arc::clone(&mapping),
      },
      mean_confidence: mean_confidence_per_class(&[0.5, 0.25], &[1, 0], &mapping).unwrap(),
    }]);

    let sink = MemorySink::default();
    sink.log(table.title(), Artifact::Table(&table)).unwrap();

    let entries = sink.entries();
    assert_eq!(entries[0].rows, Some(1));
    let cell = entries[0].payload["data"][0][2].as_object().unwrap();
    assert_eq!(
      cell.keys().map(String::as_str).collect::<Vec<_>>(),
      vec!["dog", "cat"]
    );
  }
}
