// 该文件是 Guance （观测） 项目的一部分。
// src/normalize.rs - 边界框归一化
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

use serde::{Serialize, Serializer, ser::SerializeStruct};

use crate::{bbox::BoxFormat, error::Error, label::ClassMapping, model::Detection};

/// 相对于图像宽高的边界框位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxPosition {
  #[serde(rename = "minX")]
  pub min_x: f32,
  #[serde(rename = "minY")]
  pub min_y: f32,
  #[serde(rename = "maxX")]
  pub max_x: f32,
  #[serde(rename = "maxY")]
  pub max_y: f32,
}

/// 归一化后带类别标签的检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAnnotation {
  pub position: BoxPosition,
  pub class_id: u32,
  pub label: String,
  pub confidence: f32,
}

impl Serialize for NormalizedAnnotation {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Scores {
      confidence: f32,
    }

    let mut state = serializer.serialize_struct("NormalizedAnnotation", 4)?;
    state.serialize_field("position", &self.position)?;
    state.serialize_field("class_id", &self.class_id)?;
    state.serialize_field("box_caption", &self.label)?;
    state.serialize_field(
      "scores",
      &Scores {
        confidence: self.confidence,
      },
    )?;
    state.end()
  }
}

/// 将源格式边界框换算为相对图像宽高的比例
///
/// 超出图像范围的坐标原样保留，不做裁剪；由下游决定如何处理。
pub fn normalize(
  bbox: [f32; 4],
  width: u32,
  height: u32,
  format: BoxFormat,
) -> Result<BoxPosition, Error> {
  if width == 0 || height == 0 {
    return Err(Error::InvalidImage { width, height });
  }

  let (w, h) = (width as f32, height as f32);
  let [x_min, y_min, x_max, y_max] = format.to_xyxy(bbox, w, h);

  Ok(BoxPosition {
    min_x: x_min / w,
    min_y: y_min / h,
    max_x: x_max / w,
    max_y: y_max / h,
  })
}

pub fn annotate(
  detection: &Detection,
  width: u32,
  height: u32,
  format: BoxFormat,
  class_mapping: &ClassMapping,
) -> Result<NormalizedAnnotation, Error> {
  let label = class_mapping
    .get(detection.class_id)
    .ok_or(Error::UnknownClass(detection.class_id))?;

  Ok(NormalizedAnnotation {
    position: normalize(detection.bbox, width, height, format)?,
    class_id: detection.class_id,
    label: label.to_string(),
    confidence: detection.confidence,
  })
}
