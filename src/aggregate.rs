// 该文件是 Guance （观测） 项目的一部分。
// src/aggregate.rs - 逐类别平均置信度
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

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{error::Error, label::ClassMapping};

/// 类别名称到平均置信度的映射
///
/// 按类别首次出现的顺序排列。没有检测的类别不出现，而不是记为 0。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeanConfidenceRow {
  entries: Vec<(String, f32)>,
}

impl MeanConfidenceRow {
  pub fn get(&self, label: &str) -> Option<f32> {
    self
      .entries
      .iter()
      .find(|(l, _)| l == label)
      .map(|(_, mean)| *mean)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
    self.entries.iter().map(|(label, mean)| (label.as_str(), *mean))
  }

  pub fn labels(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(label, _)| label.as_str())
  }
}

impl Serialize for MeanConfidenceRow {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;
    for (label, mean) in &self.entries {
      map.serialize_entry(label, mean)?;
    }
    map.end()
  }
}

pub fn mean_confidence_per_class(
  confidences: &[f32],
  classes: &[u32],
  class_mapping: &ClassMapping,
) -> Result<MeanConfidenceRow, Error> {
  if confidences.len() != classes.len() {
    return Err(Error::LengthMismatch {
      confidences: confidences.len(),
      classes: classes.len(),
    });
  }

  // (class_id, sum, count)，保持首次出现顺序
  let mut sums: Vec<(u32, f64, usize)> = Vec::new();
  for (&confidence, &class_id) in confidences.iter().zip(classes) {
    if !class_mapping.contains(class_id) {
      return Err(Error::UnknownClass(class_id));
    }
    match sums.iter_mut().find(|(id, _, _)| *id == class_id) {
      Some((_, sum, count)) => {
        *sum += confidence as f64;
        *count += 1;
      }
      None => sums.push((class_id, confidence as f64, 1)),
    }
  }

  let mut entries: Vec<(String, f32)> = Vec::with_capacity(sums.len());
  for (class_id, sum, count) in sums {
    let Some(label) = class_mapping.get(class_id) else {
      return Err(Error::UnknownClass(class_id));
    };
    // 不同类别共用名称时无法区分
    if entries.iter().any(|(l, _)| l == label) {
      return Err(Error::DuplicateLabel(label.to_string()));
    }
    entries.push((label.to_string(), (sum / count as f64) as f32));
  }

  Ok(MeanConfidenceRow { entries })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pets() -> ClassMapping {
    [(0, "cat"), (1, "dog"), (2, "bird")].into_iter().collect()
  }

  #[test]
  fn one_detection_per_class() {
    let row = mean_confidence_per_class(&[0.9, 0.3], &[0, 1], &pets()).unwrap();
    assert_eq!(
      row.iter().collect::<Vec<_>>(),
      vec![("cat", 0.9), ("dog", 0.3)]
    );
  }

  #[test]
  fn absent_classes_are_omitted() {
    let row = mean_confidence_per_class(&[0.4, 0.6], &[1, 1], &pets()).unwrap();
    assert_eq!(row.len(), 1);
    assert!((row.get("dog").unwrap() - 0.5).abs() < 1e-6);
    assert_eq!(row.get("cat"), None);
    assert_eq!(row.get("bird"), None);
  }

  #[test]
  fn empty_input_gives_empty_row() {
    let row = mean_confidence_per_class(&[], &[], &pets()).unwrap();
    assert!(row.is_empty());
  }

  #[test]
  fn weighted_means_sum_to_total_confidence() {
    let confidences = [0.11, 0.52, 0.73, 0.24, 0.95, 0.36, 0.07];
    let classes = [2, 0, 2, 1, 0, 2, 1];
    let row = mean_confidence_per_class(&confidences, &classes, &pets()).unwrap();

    let weighted: f32 = row
      .iter()
      .map(|(label, mean)| {
        let id = pets().iter().find(|(_, l)| *l == label).unwrap().0;
        classes.iter().filter(|&&c| c == id).count() as f32 * mean
      })
      .sum();
    let total: f32 = confidences.iter().sum();
    assert!((weighted - total).abs() < 1e-5);
  }

  #[test]
  fn content_is_order_independent_but_order_follows_first_occurrence() {
    let forward = mean_confidence_per_class(&[0.2, 0.8, 0.4], &[1, 0, 1], &pets()).unwrap();
    let reverse = mean_confidence_per_class(&[0.4, 0.8, 0.2], &[1, 0, 1], &pets()).unwrap();
    let swapped = mean_confidence_per_class(&[0.8, 0.2, 0.4], &[0, 1, 1], &pets()).unwrap();

    assert_eq!(forward, reverse);
    assert_eq!(forward.labels().collect::<Vec<_>>(), vec!["dog", "cat"]);
    assert_eq!(swapped.labels().collect::<Vec<_>>(), vec!["cat", "dog"]);
    for label in ["cat", "dog"] {
      assert!((forward.get(label).unwrap() - swapped.get(label).unwrap()).abs() < 1e-6);
    }
  }

  #[test]
  fn rejects_length_mismatch() {
    assert!(matches!(
      mean_confidence_per_class(&[0.5, 0.5], &[0], &pets()),
      Err(Error::LengthMismatch {
        confidences: 2,
        classes: 1
      })
    ));
  }

  #[test]
  fn rejects_unknown_class() {
    let mapping: ClassMapping = [(0, "cat"), (1, "dog")].into_iter().collect();
    assert!(matches!(
      mean_confidence_per_class(&[0.1, 0.2, 0.3], &[0, 0, 5], &mapping),
      Err(Error::UnknownClass(5))
    ));
  }

  #[test]
  fn rejects_labels_shared_by_two_classes() {
    let mapping: ClassMapping = [(0, "pet"), (1, "pet")].into_iter().collect();
    assert!(matches!(
      mean_confidence_per_class(&[0.9, 0.1], &[0, 1], &mapping),
      Err(Error::DuplicateLabel(label)) if label == "pet"
    ));
    // 只出现其中一个类别时没有歧义
    let row = mean_confidence_per_class(&[0.9], &[0], &mapping).unwrap();
    assert_eq!(row.get("pet"), Some(0.9));
  }

  #[test]
  fn serializes_in_insertion_order() {
    let row = mean_confidence_per_class(&[0.5, 0.25], &[1, 0], &pets()).unwrap();
    assert_eq!(
      serde_json::to_string(&row).unwrap(),
      r#"{"dog":0.5,"cat":0.25}"#
    );
  }
}
