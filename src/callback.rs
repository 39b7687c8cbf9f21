// 该文件是 Guance （观测） 项目的一部分。
// src/callback.rs - 训练回调与检测可视化
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

use std::{fmt, sync::Arc, time::Instant};

use tracing::{debug, error, info, warn};

use crate::{
  aggregate::mean_confidence_per_class,
  bbox::BoxFormat,
  dataset::{Batch, Dataset},
  error::Error,
  label::ClassMapping,
  model::{DecoderGuard, Model, SharedDecoder},
  normalize::annotate,
  sink::{Artifact, Sink},
  table::{AnnotatedImage, TableRow, VisualizationTable},
};

/// 训练循环在观测点调用的回调
pub trait TrainingCallback<M> {
  type Error;
  fn on_epoch_end(&mut self, epoch: usize, model: &mut M) -> Result<(), Self::Error>;
  fn on_train_end(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizerState {
  Idle,
  Observing,
  Flushed,
}

impl fmt::Display for VisualizerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      VisualizerState::Idle => "Idle",
      VisualizerState::Observing => "Observing",
      VisualizerState::Flushed => "Flushed",
    };
    f.write_str(name)
  }
}

/// 每轮结束时对验证集做检测并累积到表格，训练结束时一次性输出
///
/// 观测期间临时替换模型的解码策略，并在任何退出路径上恢复。
/// 同一模型不能同时参与多个观测。
pub struct DetectionVisualizer<D, S> {
  dataset: D,
  class_mapping: Arc<ClassMapping>,
  sink: S,
  decoder: SharedDecoder,
  format: BoxFormat,
  max_batches: usize,
  table: VisualizationTable,
  state: VisualizerState,
}

impl<D: Dataset, S: Sink> DetectionVisualizer<D, S> {
  pub(crate) fn new(
    dataset: D,
    class_mapping: Arc<ClassMapping>,
    sink: S,
    decoder: SharedDecoder,
    format: BoxFormat,
    max_batches: usize,
    title: String,
  ) -> Self {
    Self {
      dataset,
      class_mapping,
      sink,
      decoder,
      format,
      max_batches,
      table: VisualizationTable::new(title),
      state: VisualizerState::Idle,
    }
  }

  pub fn state(&self) -> VisualizerState {
    self.state
  }

  pub fn table(&self) -> &VisualizationTable {
    &self.table
  }

  pub fn decoder(&self) -> &SharedDecoder {
    &self.decoder
  }

  pub fn class_mapping(&self) -> &ClassMapping {
    &self.class_mapping
  }

  pub fn sink(&self) -> &S {
    &self.sink
  }

  /// 对一轮训练做一次观测，返回新增的行数
  ///
  /// 某个批次失败时，该批次不产生任何行，错误直接返回；
  /// 之前批次已追加的行保留。
  pub fn observe<M: Model>(&mut self, epoch: usize, model: &mut M) -> Result<usize, Error> {
    if self.state != VisualizerState::Idle {
      error!("第 {} 轮观测被拒绝, 当前状态 {}", epoch, self.state);
      return Err(Error::InvalidState {
        operation: "observe",
        state: self.state,
      });
    }

    let now = Instant::now();
    let result = {
      let _observing = ObservingGuard::enter(&mut self.state);
      let plotter = Plotter {
        format: self.format,
        class_mapping: &self.class_mapping,
      };
      observe_batches(
        epoch,
        model,
        &self.dataset,
        &self.decoder,
        &plotter,
        self.max_batches,
        &mut self.table,
      )
    };

    match &result {
      Ok(rows) => info!(
        "第 {} 轮观测完成: {} 行, 耗时 {:.2?}",
        epoch,
        rows,
        now.elapsed()
      ),
      Err(e) => warn!("第 {} 轮观测中止: {}", epoch, e),
    }
    result
  }

  /// 把累积的表格交给日志输出，只能调用一次
  ///
  /// 输出失败时状态不变，可以重试。
  pub fn flush(&mut self) -> Result<(), Error> {
    if self.state != VisualizerState::Idle {
      error!("重复输出表格, 当前状态 {}", self.state);
      return Err(Error::InvalidState {
        operation: "flush",
        state: self.state,
      });
    }

    self
      .sink
      .log(self.table.title(), Artifact::Table(&self.table))
      .map_err(Error::sink)?;
    self.state = VisualizerState::Flushed;
    info!(
      "表格 '{}' 已输出, 共 {} 行",
      self.table.title(),
      self.table.len()
    );
    Ok(())
  }
}

impl<M: Model, D: Dataset, S: Sink> TrainingCallback<M> for DetectionVisualizer<D, S> {
  type Error = Error;

  fn on_epoch_end(&mut self, epoch: usize, model: &mut M) -> Result<(), Self::Error> {
    self.observe(epoch, model).map(|_| ())
  }

  fn on_train_end(&mut self) -> Result<(), Self::Error> {
    self.flush()
  }
}

/// 观测期间保持 `Observing`，任何退出路径（包括 panic）都回到 `Idle`
struct ObservingGuard<'s> {
  state: &'s mut VisualizerState,
}

impl<'s> ObservingGuard<'s> {
  fn enter(state: &'s mut VisualizerState) -> Self {
    *state = VisualizerState::Observing;
    Self { state }
  }
}

impl Drop for ObservingGuard<'_> {
  fn drop(&mut self) {
    *self.state = VisualizerState::Idle;
  }
}

fn observe_batches<M: Model, D: Dataset>(
  epoch: usize,
  model: &mut M,
  dataset: &D,
  decoder: &SharedDecoder,
  plotter: &Plotter<'_>,
  max_batches: usize,
  table: &mut VisualizationTable,
) -> Result<usize, Error> {
  let model = DecoderGuard::swap_in(model, Arc::clone(decoder));

  let mut appended = 0;
  let mut drawn = 0;
  for (index, batch) in dataset.batches().take(max_batches).enumerate() {
    drawn += 1;
    let rows = plotter.plot(epoch, batch, &*model).inspect_err(|e| {
      error!("第 {} 轮第 {} 个批次失败: {}", epoch, index, e);
    })?;
    debug!("第 {} 个批次: {} 行", index, rows.len());
    appended += rows.len();
    table.append(rows);
  }

  if drawn < max_batches {
    warn!("数据集只有 {} 个批次, 少于配置的 {} 个", drawn, max_batches);
  }
  Ok(appended)
}

struct Plotter<'a> {
  format: BoxFormat,
  class_mapping: &'a Arc<ClassMapping>,
}

impl Plotter<'_> {
  /// 一个批次的所有行，任一图像失败则整个批次失败
  fn plot<M: Model>(&self, epoch: usize, batch: &Batch, model: &M) -> Result<Vec<TableRow>, Error> {
    let detections = model.predict(&batch.images)?;
    if detections.images.len() != batch.images.len() {
      return Err(Error::OutputMismatch {
        images: batch.images.len(),
        outputs: detections.images.len(),
      });
    }

    batch
      .images
      .iter()
      .zip(&detections.images)
      .map(|(image, detected)| -> Result<TableRow, Error> {
        let (width, height) = image.dimensions();
        let boxes = detected
          .items
          .iter()
          .map(|item| annotate(item, width, height, self.format, self.class_mapping))
          .collect::<Result<Vec<_>, _>>()?;
        let mean_confidence = mean_confidence_per_class(
          &detected.confidences(),
          &detected.classes(),
          self.class_mapping,
        )?;

        Ok(TableRow {
          epoch,
          image: AnnotatedImage {
            image: image.clone(),
            boxes,
            class_labels: Arc::clone(self.class_mapping),
          },
          mean_confidence,
        })
      })
      .collect()
  }
}
