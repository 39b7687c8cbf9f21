// 该文件是 Guance （观测） 项目的一部分。
// src/bbox.rs - 边界框格式
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

use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的边界框格式: {0}")]
pub struct UnknownBoxFormat(pub String);

/// 模型输出边界框的坐标约定
///
/// `Rel*` 格式的坐标为相对于图像宽高的比例，其余格式为像素坐标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxFormat {
  /// [x_min, y_min, x_max, y_max]
  Xyxy,
  /// [x_min, y_min, width, height]
  #[default]
  Xywh,
  /// [center_x, center_y, width, height]
  CenterXywh,
  /// [y_min, x_min, y_max, x_max]
  Yxyx,
  RelXyxy,
  RelXywh,
  RelYxyx,
}

impl BoxFormat {
  pub const ALL: [BoxFormat; 7] = [
    BoxFormat::Xyxy,
    BoxFormat::Xywh,
    BoxFormat::CenterXywh,
    BoxFormat::Yxyx,
    BoxFormat::RelXyxy,
    BoxFormat::RelXywh,
    BoxFormat::RelYxyx,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      BoxFormat::Xyxy => "xyxy",
      BoxFormat::Xywh => "xywh",
      BoxFormat::CenterXywh => "center_xywh",
      BoxFormat::Yxyx => "yxyx",
      BoxFormat::RelXyxy => "rel_xyxy",
      BoxFormat::RelXywh => "rel_xywh",
      BoxFormat::RelYxyx => "rel_yxyx",
    }
  }

  pub fn is_relative(&self) -> bool {
    matches!(
      self,
      BoxFormat::RelXyxy | BoxFormat::RelXywh | BoxFormat::RelYxyx
    )
  }

  /// 转换为像素坐标 [x_min, y_min, x_max, y_max]
  ///
  /// 不做裁剪，也不检查 min <= max。
  pub fn to_xyxy(&self, bbox: [f32; 4], width: f32, height: f32) -> [f32; 4] {
    let [a, b, c, d] = bbox;
    match self {
      BoxFormat::Xyxy => [a, b, c, d],
      BoxFormat::Xywh => [a, b, a + c, b + d],
      BoxFormat::CenterXywh => [a - c / 2.0, b - d / 2.0, a + c / 2.0, b + d / 2.0],
      BoxFormat::Yxyx => [b, a, d, c],
      BoxFormat::RelXyxy => [a * width, b * height, c * width, d * height],
      BoxFormat::RelXywh => [
        a * width,
        b * height,
        (a + c) * width,
        (b + d) * height,
      ],
      BoxFormat::RelYxyx => [b * width, a * height, d * width, c * height],
    }
  }
}

impl FromStr for BoxFormat {
  type Err = UnknownBoxFormat;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.trim().to_lowercase();
    BoxFormat::ALL
      .into_iter()
      .find(|format| format.as_str() == lower)
      .ok_or_else(|| UnknownBoxFormat(s.to_string()))
  }
}

impl fmt::Display for BoxFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 计算两个 [x_min, y_min, x_max, y_max] 边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_every_format_name() {
    for format in BoxFormat::ALL {
      assert_eq!(format.as_str().parse::<BoxFormat>(), Ok(format));
    }
    assert_eq!("XYWH".parse::<BoxFormat>(), Ok(BoxFormat::Xywh));
    assert!("xywhr".parse::<BoxFormat>().is_err());
  }

  #[test]
  fn converts_to_corners() {
    assert_eq!(
      BoxFormat::Xywh.to_xyxy([10.0, 20.0, 30.0, 40.0], 100.0, 100.0),
      [10.0, 20.0, 40.0, 60.0]
    );
    assert_eq!(
      BoxFormat::CenterXywh.to_xyxy([50.0, 50.0, 20.0, 10.0], 100.0, 100.0),
      [40.0, 45.0, 60.0, 55.0]
    );
    assert_eq!(
      BoxFormat::Yxyx.to_xyxy([1.0, 2.0, 3.0, 4.0], 100.0, 100.0),
      [2.0, 1.0, 4.0, 3.0]
    );
    assert_eq!(
      BoxFormat::RelXyxy.to_xyxy([0.1, 0.2, 0.5, 0.5], 200.0, 100.0),
      [20.0, 20.0, 100.0, 50.0]
    );
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);

    let half = [5.0, 0.0, 15.0, 10.0];
    assert!((iou(&a, &half) - 50.0 / 150.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_degenerate_boxes_is_zero() {
    let point = [1.0, 1.0, 1.0, 1.0];
    assert_eq!(iou(&point, &point), 0.0);
  }
}
