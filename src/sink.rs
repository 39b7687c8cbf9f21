// 该文件是 Guance （观测） 项目的一部分。
// src/sink.rs - 日志输出
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
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  table::{AnnotatedImage, VisualizationTable},
};

/// 交给日志输出的命名产物
#[derive(Debug, Clone, Copy)]
pub enum Artifact<'a> {
  Table(&'a VisualizationTable),
  Image(&'a AnnotatedImage),
}

impl Artifact<'_> {
  pub fn kind(&self) -> &'static str {
    match self {
      Artifact::Table(_) => "table",
      Artifact::Image(_) => "image",
    }
  }
}

/// 实验记录后端
pub trait Sink {
  type Error: std::error::Error + Send + Sync + 'static;
  fn log(&self, name: &str, artifact: Artifact<'_>) -> Result<(), Self::Error>;
}

impl<S: Sink> Sink for &S {
  type Error = S::Error;

  fn log(&self, name: &str, artifact: Artifact<'_>) -> Result<(), Self::Error> {
    (**self).log(name, artifact)
  }
}

mod memory;
pub use self::memory::{LoggedArtifact, MemorySink};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordSink, DirectoryRecordSinkError};

#[cfg(feature = "draw_boxes")]
pub mod draw;

#[derive(Error, Debug)]
pub enum SinkError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordSinkError(#[from] DirectoryRecordSinkError),
  #[error("内存输出序列化错误: {0}")]
  MemorySinkError(#[from] serde_json::Error),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum SinkWrapper {
  Memory(MemorySink),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordSink),
}

impl FromUrl for SinkWrapper {
  type Error = SinkError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      MemorySink::SCHEME => Ok(SinkWrapper::Memory(MemorySink::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordSink::SCHEME => {
        let sink = DirectoryRecordSink::from_url(url)?;
        Ok(SinkWrapper::DirectoryRecord(sink))
      }
      _ => Err(SinkError::SchemeMismatch),
    }
  }
}

impl Sink for SinkWrapper {
  type Error = SinkError;

  fn log(&self, name: &str, artifact: Artifact<'_>) -> Result<(), Self::Error> {
    match self {
      SinkWrapper::Memory(sink) => sink.log(name, artifact).map_err(SinkError::from),
      #[cfg(feature = "directory_record")]
      SinkWrapper::DirectoryRecord(sink) => sink.log(name, artifact).map_err(SinkError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn selects_sink_by_scheme() {
    let memory = SinkWrapper::from_url(&Url::parse("memory:").unwrap()).unwrap();
    assert!(matches!(memory, SinkWrapper::Memory(_)));

    assert!(matches!(
      SinkWrapper::from_url(&Url::parse("s3://bucket/run").unwrap()),
      Err(SinkError::SchemeMismatch)
    ));
  }

  #[test]
  fn wrapper_forwards_to_inner_sink() {
    let sink = SinkWrapper::Memory(MemorySink::default());
    let table = VisualizationTable::new("Evaluation-Table");
    sink.log("Evaluation-Table", Artifact::Table(&table)).unwrap();

    let SinkWrapper::Memory(memory) = &sink else {
      unreachable!()
    };
    assert_eq!(memory.len(), 1);
  }
}
