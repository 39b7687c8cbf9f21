// 该文件是 Guance （观测） 项目的一部分。
// src/bin/replay_visualization.rs - 回放模型输出并生成可视化表格
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use guance::{
  FromUrl, VisualizerBuilder,
  dataset::ImageDirectoryDataset,
  label::ClassMapping,
  model::ReplayModel,
  sink::SinkWrapper,
  task::{EpochTask, Task},
};

/// Guance 回放参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 验证图像来源，例如 image:///data/val?batch=4
  #[arg(long, value_name = "SOURCE")]
  pub dataset: Url,
  /// 录制的模型输出，例如 replay:///data/raw.json?format=xywh
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 类别映射 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,
  /// 日志输出，例如 folder:///runs/vis?draw
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 可视化配置，例如 detvis:?batches=2&iou=0.45
  #[arg(long, value_name = "CONFIG", default_value = "detvis:")]
  pub config: Url,
  /// 模拟的训练轮数
  #[arg(long, default_value_t = 1, value_name = "EPOCHS")]
  pub epochs: usize,
  /// 任一轮观测失败即退出
  #[arg(long)]
  pub stop_on_error: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("验证图像来源: {}", args.dataset);
  info!("模型输出: {}", args.model);
  info!("类别映射: {}", args.labels.display());
  info!("输出路径: {}", args.output);

  let dataset = ImageDirectoryDataset::from_url(&args.dataset)?;
  let mut model = ReplayModel::from_url(&args.model)?;
  let class_mapping = ClassMapping::from_path(&args.labels)?;
  let sink = SinkWrapper::from_url(&args.output)?;

  let mut visualizer = VisualizerBuilder::from_url(&args.config)?.build(dataset, class_mapping, sink)?;

  EpochTask::default()
    .with_epochs(args.epochs)
    .with_stop_on_error(args.stop_on_error)
    .run_task(&mut model, &mut visualizer)?;

  info!("共记录 {} 行", visualizer.table().len());
  Ok(())
}
