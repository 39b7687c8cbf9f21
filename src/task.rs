// 该文件是 Guance （观测） 项目的一部分。
// src/task.rs - 训练轮次驱动
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

use std::time::Instant;

use tracing::{info, warn};

use crate::{callback::TrainingCallback, error::Error};

pub trait Task<M, C>: Sized {
  type Error;
  fn run_task(self, model: &mut M, callback: &mut C) -> Result<(), Self::Error>;
}

/// 依次触发每轮结束与训练结束的观测点
///
/// 默认单个批次范围内的失败只记录警告并继续下一轮；
/// 其他错误（未知类别、状态错误等）说明调用方有误，直接返回。
#[derive(Default, Debug)]
pub struct EpochTask {
  epochs: usize,
  stop_on_error: bool,
}

impl EpochTask {
  pub fn with_epochs(mut self, epochs: usize) -> Self {
    self.epochs = epochs;
    self
  }

  pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
    self.stop_on_error = stop_on_error;
    self
  }
}

impl<M, C> Task<M, C> for EpochTask
where
  C: TrainingCallback<M, Error = Error>,
{
  type Error = anyhow::Error;

  fn run_task(self, model: &mut M, callback: &mut C) -> Result<(), Self::Error> {
    info!("开始任务, 共 {} 轮", self.epochs);
    let mut failures = 0usize;

    for epoch in 0..self.epochs {
      let now = Instant::now();
      match callback.on_epoch_end(epoch, model) {
        Ok(()) => info!("第 {} 轮完成, 耗时: {:.2?}", epoch, now.elapsed()),
        Err(e) if e.is_batch_scoped() && !self.stop_on_error => {
          failures += 1;
          warn!("第 {} 轮观测失败, 继续: {}", epoch, e);
        }
        Err(e) => return Err(e.into()),
      }
    }

    callback.on_train_end()?;

    if failures > 0 {
      warn!("{} 轮观测失败", failures);
    }
    info!("任务完成, 退出");
    Ok(())
  }
}
