// 该文件是 Ringsight （寻环） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::io::{self, Write};

use anyhow::{Result, anyhow};
use clap::Parser;
use serde_json::json;
use tracing::info;

use ringsight::{
  FromUrl,
  detector::{BestBox, YoloDetection},
  frame::RgbNhwcFrame,
  input::ImageFileInput,
  model::{YoloOnnx, YoloOnnxBuilder},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.iou);

  let model: YoloOnnx<RgbNhwcFrame> = YoloOnnxBuilder::from_url(&args.model)?
    .input_size(args.input_size)
    .confidence(args.confidence)
    .iou(args.iou)
    .build()?;
  let detector = YoloDetection::new(model);

  let frame = ImageFileInput::from_url(&args.input)?
    .into_frame()
    .ok_or_else(|| anyhow!("没有输入帧"))?;

  info!("开始推理...");
  let now = std::time::Instant::now();
  let best = detector.detect(&frame)?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  report(&mut io::stdout().lock(), best.as_ref(), args.json)?;

  if let Some(output) = &args.output {
    save_output(output, &frame, &best)?;
  }

  Ok(())
}

fn report<W: Write>(out: &mut W, best: Option<&BestBox>, as_json: bool) -> io::Result<()> {
  if as_json {
    let value = match best {
      Some(best) => json!({
        "bbox": best.rect.to_array(),
        "format": "xywh",
        "confidence": best.confidence,
        "class_id": best.class_id,
      }),
      None => json!({ "bbox": null }),
    };
    return writeln!(out, "{}", value);
  }

  match best {
    Some(best) => {
      writeln!(
        out,
        "最佳检测: {} (类别 {}, 置信度 {:.2}%)",
        best.rect,
        best.class_id,
        best.confidence * 100.0
      )?;
      writeln!(out, "Format: [x, y, w, h]")
    }
    None => writeln!(out, "未检测到目标"),
  }
}

#[cfg(feature = "save_image_file")]
fn save_output(output: &url::Url, frame: &RgbNhwcFrame, best: &Option<BestBox>) -> Result<()> {
  use ringsight::output::{Render, SaveImageFileOutput};

  let output = SaveImageFileOutput::from_url(output)?;
  output.render_result(frame, best)?;
  Ok(())
}

#[cfg(not(feature = "save_image_file"))]
fn save_output(output: &url::Url, _frame: &RgbNhwcFrame, _best: &Option<BestBox>) -> Result<()> {
  Err(anyhow!(
    "未启用 save_image_file 特性，无法写出 {}",
    output
  ))
}
