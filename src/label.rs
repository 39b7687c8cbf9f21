// 该文件是 Guance （观测） 项目的一部分。
// src/label.rs - 类别映射
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

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("类别 ID 无效: {0}")]
  InvalidId(String),
  #[error("类别 {0} 的名称必须是字符串")]
  InvalidLabel(String),
  #[error("类别映射必须是 JSON 对象或数组")]
  InvalidShape,
  #[error("类别名称 {0} 重复")]
  DuplicateLabel(String),
}

/// 类别 ID 到类别名称的有序映射，按 ID 升序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClassMapping {
  labels: BTreeMap<u32, String>,
}

impl ClassMapping {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_label(mut self, id: u32, label: impl Into<String>) -> Self {
    self.labels.insert(id, label.into());
    self
  }

  pub fn get(&self, id: u32) -> Option<&str> {
    self.labels.get(&id).map(String::as_str)
  }

  pub fn contains(&self, id: u32) -> bool {
    self.labels.contains_key(&id)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
    self.labels.iter().map(|(id, label)| (*id, label.as_str()))
  }

  /// 从 JSON 解析，支持 `{"0": "cat"}` 与 `["cat", "dog"]` 两种写法
  pub fn from_json_str(json: &str) -> Result<Self, LabelError> {
    let value: Value = serde_json::from_str(json)?;
    let mut labels = BTreeMap::new();

    match value {
      Value::Object(map) => {
        for (key, label) in map {
          let id = key
            .trim()
            .parse::<u32>()
            .map_err(|_| LabelError::InvalidId(key.clone()))?;
          let label = label
            .as_str()
            .ok_or_else(|| LabelError::InvalidLabel(key.clone()))?;
          labels.insert(id, label.to_string());
        }
      }
      Value::Array(items) => {
        for (id, label) in items.into_iter().enumerate() {
          let label = label
            .as_str()
            .ok_or_else(|| LabelError::InvalidLabel(id.to_string()))?
            .to_string();
          let id = u32::try_from(id).map_err(|_| LabelError::InvalidId(id.to_string()))?;
          labels.insert(id, label);
        }
      }
      _ => return Err(LabelError::InvalidShape),
    }

    let mut seen = BTreeSet::new();
    if let Some(label) = labels.values().find(|label| !seen.insert(label.as_str())) {
      return Err(LabelError::DuplicateLabel(label.clone()));
    }

    debug!("加载类别映射: {} 个类别", labels.len());
    Ok(Self { labels })
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let json = std::fs::read_to_string(path)?;
    Self::from_json_str(&json)
  }
}

impl<S: Into<String>> FromIterator<(u32, S)> for ClassMapping {
  fn from_iter<I: IntoIterator<Item = (u32, S)>>(iter: I) -> Self {
    Self {
      labels: iter
        .into_iter()
        .map(|(id, label)| (id, label.into()))
        .collect(),
    }
  }
}
