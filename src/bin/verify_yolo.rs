// 该文件是 Ringsight （寻环） 项目的一部分。
// src/bin/verify_yolo.rs - 检测流程冒烟测试
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

use std::{io, path::PathBuf};

use clap::Parser;
use tracing::{error, info};

use ringsight::{
  detector::YoloDetection, driver::SmokeTest, frame::RgbNhwcFrame, model::YoloOnnx,
};

/// 冒烟测试参数，默认使用仓库旁的模型与样例图像
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct VerifyArgs {
  /// ONNX 模型文件路径
  #[arg(long, value_name = "FILE")]
  pub model: Option<PathBuf>,
  /// 样例图像路径
  #[arg(long, value_name = "FILE")]
  pub image: Option<PathBuf>,
}

fn main() {
  tracing_subscriber::fmt::init();

  let args = VerifyArgs::parse();
  let defaults = SmokeTest::relative_to(env!("CARGO_MANIFEST_DIR"));
  let smoke = SmokeTest::new(
    args
      .model
      .unwrap_or_else(|| defaults.model_path().to_path_buf()),
    args
      .image
      .unwrap_or_else(|| defaults.image_path().to_path_buf()),
  );

  let stdout = io::stdout();
  let mut out = stdout.lock();
  let outcome = smoke.run(
    |path| Ok(YoloDetection::<YoloOnnx<RgbNhwcFrame>>::from_path(path)?),
    &mut out,
  );

  match outcome {
    Ok(outcome) => info!("冒烟测试结束: {:?}", outcome),
    Err(e) => error!("写出报告失败: {}", e),
  }
}
