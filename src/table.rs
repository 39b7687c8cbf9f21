// 该文件是 Guance （观测） 项目的一部分。
// src/table.rs - 可视化表格
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

use image::RgbImage;
use serde::{
  Serialize, Serializer,
  ser::{SerializeStruct, SerializeTuple},
};

use crate::{aggregate::MeanConfidenceRow, label::ClassMapping, normalize::NormalizedAnnotation};

pub const TABLE_COLUMNS: [&str; 3] = ["Epoch", "Image", "Mean-Confidence"];

/// 带预测框标注的图像
///
/// 序列化时只输出尺寸与标注，不包含像素数据。
#[derive(Debug, Clone)]
pub struct AnnotatedImage {
  pub image: RgbImage,
  pub boxes: Vec<NormalizedAnnotation>,
  pub class_labels: Arc<ClassMapping>,
}

impl AnnotatedImage {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

impl Serialize for AnnotatedImage {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Predictions<'a> {
      box_data: &'a [NormalizedAnnotation],
      class_labels: &'a ClassMapping,
    }

    #[derive(Serialize)]
    struct Boxes<'a> {
      predictions: Predictions<'a>,
    }

    let mut state = serializer.serialize_struct("AnnotatedImage", 3)?;
    state.serialize_field("width", &self.width())?;
    state.serialize_field("height", &self.height())?;
    state.serialize_field(
      "boxes",
      &Boxes {
        predictions: Predictions {
          box_data: &self.boxes,
          class_labels: &self.class_labels,
        },
      },
    )?;
    state.end()
  }
}

/// 表格中的一行: (轮次, 图像, 平均置信度)
#[derive(Debug, Clone)]
pub struct TableRow {
  pub epoch: usize,
  pub image: AnnotatedImage,
  pub mean_confidence: MeanConfidenceRow,
}

impl Serialize for TableRow {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut row = serializer.serialize_tuple(TABLE_COLUMNS.len())?;
    row.serialize_element(&self.epoch)?;
    row.serialize_element(&self.image)?;
    row.serialize_element(&self.mean_confidence)?;
    row.end()
  }
}

/// 只追加的可视化表格
#[derive(Debug, Clone, Serialize)]
pub struct VisualizationTable {
  title: String,
  columns: [&'static str; 3],
  #[serde(rename = "data")]
  rows: Vec<TableRow>,
}

impl VisualizationTable {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      columns: TABLE_COLUMNS,
      rows: Vec::new(),
    }
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn columns(&self) -> &[&'static str] {
    &self.columns
  }

  pub fn rows(&self) -> &[TableRow] {
    &self.rows
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub(crate) fn append(&mut self, rows: Vec<TableRow>) {
    self.rows.extend(rows);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{aggregate::mean_confidence_per_class, normalize::BoxPosition};

  fn row(epoch: usize) -> TableRow {
    let mapping: Arc<ClassMapping> = Arc::new([(0, "cat")].into_iter().collect());
    TableRow {
      epoch,
      image: AnnotatedImage {
        image: RgbImage::new(4, 2),
        boxes: vec![NormalizedAnnotation {
          position: BoxPosition {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.5,
            max_y: 0.5,
          },
          class_id: 0,
          label: "cat".to_string(),
          confidence: 0.75,
        }],
        class_labels: Arc::clone(&mapping),
      },
      mean_confidence: mean_confidence_per_class(&[0.75], &[0], &mapping).unwrap(),
    }
  }

  #[test]
  fn appends_in_order() {
    let mut table = VisualizationTable::new("Evaluation-Table");
    table.append(vec![row(0), row(0)]);
    table.append(vec![row(1)]);

    assert_eq!(table.len(), 3);
    assert_eq!(
      table.rows().iter().map(|r| r.epoch).collect::<Vec<_>>(),
      vec![0, 0, 1]
    );
  }

  #[test]
  fn serializes_columns_and_rows() {
    let mut table = VisualizationTable::new("Evaluation-Table");
    table.append(vec![row(3)]);

    let json = serde_json::to_value(&table).unwrap();
    assert_eq!(json["title"], "Evaluation-Table");
    assert_eq!(
      json["columns"],
      serde_json::json!(["Epoch", "Image", "Mean-Confidence"])
    );
    let data = &json["data"][0];
    assert_eq!(data[0], 3);
    assert_eq!(data[1]["width"], 4);
    assert_eq!(
      data[1]["boxes"]["predictions"]["box_data"][0]["box_caption"],
      "cat"
    );
    assert_eq!(data[1]["boxes"]["predictions"]["class_labels"]["0"], "cat");
    assert_eq!(data[2]["cat"], 0.75);
  }
}
