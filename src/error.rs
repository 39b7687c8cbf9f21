// 该文件是 Guance （观测） 项目的一部分。
// src/error.rs - 错误定义
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

use crate::{callback::VisualizerState, decoder::DecodeError};

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("图像尺寸无效: {width}x{height}")]
  InvalidImage { width: u32, height: u32 },
  #[error("置信度数量 {confidences} 与类别数量 {classes} 不一致")]
  LengthMismatch { confidences: usize, classes: usize },
  #[error("未知类别 ID: {0}")]
  UnknownClass(u32),
  #[error("类别名称 {0} 对应多个类别 ID")]
  DuplicateLabel(String),
  #[error("状态 {state} 下不允许执行 {operation}")]
  InvalidState {
    operation: &'static str,
    state: VisualizerState,
  },
  #[error("解码失败: {0}")]
  DecodeFailure(#[from] DecodeError),
  #[error("模型推理失败: {0}")]
  Model(#[source] BoxedError),
  #[error("批次包含 {images} 张图像，但模型输出了 {outputs} 张图像的结果")]
  OutputMismatch { images: usize, outputs: usize },
  #[error("日志输出失败: {0}")]
  Sink(#[source] BoxedError),
}

impl Error {
  pub fn model<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Error::Model(Box::new(e))
  }

  pub fn sink<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Error::Sink(Box::new(e))
  }

  /// 单个批次范围内的失败，不影响后续训练
  pub fn is_batch_scoped(&self) -> bool {
    matches!(
      self,
      Error::DecodeFailure(_) | Error::Model(_) | Error::OutputMismatch { .. }
    )
  }
}
