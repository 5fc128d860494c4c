// 该文件是 Ringsight （寻环） 项目的一部分。
// src/driver.rs - 冒烟测试流程
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

//! 手动运行的冒烟测试：检查模型与样例图像、解码、检测并打印报告。
//!
//! 所有失败都只打印后返回，不向调用者抛出。

use std::{
  any::Any,
  backtrace::Backtrace,
  io::{self, Write},
  panic::{self, AssertUnwindSafe, PanicHookInfo},
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
  thread,
};

use anyhow::anyhow;
use tracing::{error, info, warn};

use crate::{
  detector::{BestBox, YoloDetection},
  frame::RgbNhwcFrame,
  input::ImageFileInput,
  model::{DetectResult, Model},
};

const MODEL_FILE_NAME: &str = "best 1.onnx";
const SAMPLE_IMAGE: [&str; 3] = ["TestingImages", "2024-Ring", "frame0.png"];

/// 冒烟测试的结局
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  ModelMissing,
  ImageMissing,
  DecodeFailed,
  Detected(BestBox),
  NoDetection,
  Fault(String),
}

#[derive(Debug, Clone)]
pub struct SmokeTest {
  model_path: PathBuf,
  image_path: PathBuf,
}

impl SmokeTest {
  pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(model_path: P, image_path: Q) -> Self {
    Self {
      model_path: model_path.into(),
      image_path: image_path.into(),
    }
  }

  /// 模型与样例图像都位于 `base` 的上一级目录
  pub fn relative_to<P: AsRef<Path>>(base: P) -> Self {
    let parent = base.as_ref().join("..");
    let image_path = SAMPLE_IMAGE
      .iter()
      .fold(parent.clone(), |path, part| path.join(part));
    Self::new(parent.join(MODEL_FILE_NAME), image_path)
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn image_path(&self) -> &Path {
    &self.image_path
  }

  /// 执行冒烟测试并把报告写入 `out`
  ///
  /// `load` 负责构造检测器；加载或推理中的任何错误（包括引擎 panic）
  /// 都会被捕获并打印，结果为 `Outcome::Fault`。只有写报告失败才会返回 Err。
  pub fn run<M, L, W>(&self, load: L, out: &mut W) -> io::Result<Outcome>
  where
    M: Model<Input = RgbNhwcFrame, Output = Vec<DetectResult>>,
    M::Error: std::error::Error + Send + Sync + 'static,
    L: FnOnce(&Path) -> anyhow::Result<YoloDetection<M>>,
    W: Write,
  {
    if !self.model_path.exists() {
      writeln!(out, "Error: Model not found at {}", self.model_path.display())?;
      return Ok(Outcome::ModelMissing);
    }
    if !self.image_path.exists() {
      writeln!(out, "Error: Image not found at {}", self.image_path.display())?;
      return Ok(Outcome::ImageMissing);
    }

    writeln!(out, "Testing YOLODetection...")?;
    writeln!(out, "Model: {}", self.model_path.display())?;
    writeln!(out, "Image: {}", self.image_path.display())?;

    let frame = match ImageFileInput::open(&self.image_path).map(ImageFileInput::into_frame) {
      Ok(Some(frame)) => frame,
      Ok(None) => {
        writeln!(out, "Failed to load image: no frame decoded.")?;
        return Ok(Outcome::DecodeFailed);
      }
      Err(e) => {
        warn!("图像解码失败: {}", e);
        writeln!(out, "Failed to load image: {}", e)?;
        return Ok(Outcome::DecodeFailed);
      }
    };

    let model_path = self.model_path.as_path();
    let (attempt, panic_trace) = with_panic_trace(|| {
      panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<Option<BestBox>> {
        let detector = load(model_path)?;
        Ok(detector.detect(&frame)?)
      }))
    });
    let result = match attempt {
      Ok(Ok(best)) => Ok(best),
      Ok(Err(e)) => Err((e, Backtrace::force_capture())),
      Err(payload) => Err((
        anyhow!("inference engine panicked: {}", panic_message(&*payload)),
        panic_trace.unwrap_or_else(Backtrace::force_capture),
      )),
    };

    match result {
      Ok(Some(best)) => {
        info!("最佳检测置信度: {:.3}", best.confidence);
        writeln!(out, "Detection Successful! Bounding Box: {}", best.rect)?;
        writeln!(out, "Format: [x, y, w, h]")?;
        Ok(Outcome::Detected(best))
      }
      Ok(None) => {
        writeln!(
          out,
          "No detection found (this might be expected if the image doesn't contain the object or model needs tuning)."
        )?;
        writeln!(out, "But the code pipeline executed successfully.")?;
        Ok(Outcome::NoDetection)
      }
      Err((e, trace)) => {
        error!("冒烟测试失败: {:#}", e);
        writeln!(out, "Exception occurred: {:#}", e)?;
        writeln!(out, "{:?}", e)?;
        writeln!(out, "stack backtrace:")?;
        writeln!(out, "{}", trace)?;
        Ok(Outcome::Fault(format!("{:#}", e)))
      }
    }
  }
}

type PanicHook = Arc<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

/// 执行 `f`，期间本线程的 panic 不再打印到 stderr，而是记录 panic 现场的调用栈。
/// 其他线程的 panic 仍交给原有的 hook。
fn with_panic_trace<T>(f: impl FnOnce() -> T) -> (T, Option<Backtrace>) {
  let slot: Arc<Mutex<Option<Backtrace>>> = Arc::default();
  let owner = thread::current().id();
  let previous: PanicHook = Arc::from(panic::take_hook());

  let hook_slot = Arc::clone(&slot);
  let hook_previous = Arc::clone(&previous);
  panic::set_hook(Box::new(move |info| {
    if thread::current().id() != owner {
      return hook_previous(info);
    }
    if let Ok(mut slot) = hook_slot.lock() {
      *slot = Some(Backtrace::force_capture());
    }
  }));

  let value = f();

  drop(panic::take_hook());
  panic::set_hook(Box::new(move |info| previous(info)));

  let trace = slot.lock().ok().and_then(|mut slot| slot.take());
  (value, trace)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(msg) = payload.downcast_ref::<&str>() {
    msg.to_string()
  } else if let Some(msg) = payload.downcast_ref::<String>() {
    msg.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
