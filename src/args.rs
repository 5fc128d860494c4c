// 该文件是 Ringsight （寻环） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

/// Ringsight 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型，例如 onnx:///models/best.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入图像，例如 image:///images/frame0.png
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 绘制最佳检测后保存的图像，例如 image:///tmp/out.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.7", value_name = "THRESHOLD")]
  pub iou: f32,

  /// 模型输入边长，至少 32
  #[arg(
    long,
    default_value = "640",
    value_name = "PIXELS",
    value_parser = clap::value_parser!(u32).range(32..)
  )]
  pub input_size: u32,

  /// 以 JSON 输出结果
  #[arg(long)]
  pub json: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  const BASE: [&str; 5] = [
    "ringsight",
    "--model",
    "onnx:///m.onnx",
    "--input",
    "image:///f.png",
  ];

  #[test]
  fn input_size_defaults_to_640() {
    let args = Args::try_parse_from(BASE).unwrap();
    assert_eq!(args.input_size, 640);
  }

  #[test]
  fn input_size_below_stride_is_rejected() {
    for size in ["0", "31"] {
      let argv = BASE.iter().copied().chain(["--input-size", size]);
      assert!(Args::try_parse_from(argv).is_err());
    }
    let argv = BASE.iter().copied().chain(["--input-size", "320"]);
    assert_eq!(Args::try_parse_from(argv).unwrap().input_size, 320);
  }
}
