// 该文件是 Guance （观测） 项目的一部分。
// src/sink/draw.rs - 预测框叠加绘制
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{normalize::BoxPosition, table::AnnotatedImage};

const PALETTE_SIZE: u32 = 80;

/// 将归一化坐标换算为像素坐标 [x0, y0, x1, y1]，并裁剪到图像内
///
/// 裁剪只用于绘制，标注本身保持原值。
pub fn to_pixel_rect(position: &BoxPosition, width: u32, height: u32) -> Option<[u32; 4]> {
  if width == 0 || height == 0 {
    return None;
  }
  let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
  let x0 = clamp(position.min_x * width as f32, width);
  let y0 = clamp(position.min_y * height as f32, height);
  let x1 = clamp(position.max_x * width as f32, width);
  let y1 = clamp(position.max_y * height as f32, height);
  if x0 > x1 || y0 > y1 {
    return None;
  }
  Some([x0, y0, x1, y1])
}

/// 按类别取色
pub fn class_color(class_id: u32) -> Rgb<u8> {
  let hue = (class_id % PALETTE_SIZE) as f32 / PALETTE_SIZE as f32 * 360.0;
  hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

/// 在图像副本上绘制所有预测框（2 像素边框）
pub fn draw_annotations(annotated: &AnnotatedImage) -> RgbImage {
  let mut image = annotated.image.clone();
  let (width, height) = image.dimensions();

  for annotation in &annotated.boxes {
    let Some([x0, y0, x1, y1]) = to_pixel_rect(&annotation.position, width, height) else {
      continue;
    };
    let color = class_color(annotation.class_id);

    let rect = Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0 + 1, y1 - y0 + 1);
    draw_hollow_rect_mut(&mut image, rect, color);

    // 内侧再画一圈以增加可见度
    if x1 - x0 > 2 && y1 - y0 > 2 {
      let inner = Rect::at(x0 as i32 + 1, y0 as i32 + 1).of_size(x1 - x0 - 1, y1 - y0 - 1);
      draw_hollow_rect_mut(&mut image, inner, color);
    }
  }

  image
}
