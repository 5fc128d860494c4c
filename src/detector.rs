// 该文件是 Ringsight （寻环） 项目的一部分。
// src/detector.rs - 最佳目标检测
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

use std::{fmt, path::Path};

use tracing::debug;

use crate::{
  input::AsNhwcFrame,
  model::{DetectResult, Model, YoloOnnx, YoloOnnxBuilder, YoloOnnxError},
};

/// 以左上角加宽高表示的整数边界框 [x, y, w, h]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
  pub x: i32,
  pub y: i32,
  pub w: i32,
  pub h: i32,
}

impl Rect {
  /// 由角点框 [x1, y1, x2, y2] 转换
  ///
  /// 先把两个角点截断为整数，再求差，因此宽高等于截断后的角点差。
  pub fn from_xyxy(bbox: [f32; 4]) -> Self {
    let [x1, y1, x2, y2] = bbox.map(|v| v as i32);
    Rect {
      x: x1,
      y: y1,
      w: x2 - x1,
      h: y2 - y1,
    }
  }

  pub fn to_array(self) -> [i32; 4] {
    [self.x, self.y, self.w, self.h]
  }
}

impl fmt::Display for Rect {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{},{},{},{}]", self.x, self.y, self.w, self.h)
  }
}

/// 置信度最高的检测
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestBox {
  pub rect: Rect,
  pub confidence: f32,
  pub class_id: u32,
}

/// 在所有结果组中挑选置信度最高的候选
///
/// 逐组、逐项按引擎给出的顺序扫描，只有严格大于当前最高分时才替换，
/// 所以同分时保留最先出现的候选。没有候选时返回 None。
pub fn select_best<'a, I>(groups: I) -> Option<BestBox>
where
  I: IntoIterator<Item = &'a DetectResult>,
{
  let mut highest = -1.0f32;
  let mut best = None;

  for group in groups {
    for item in group.items.iter() {
      if item.score > highest {
        highest = item.score;
        best = Some(BestBox {
          rect: Rect::from_xyxy(item.bbox),
          confidence: item.score,
          class_id: item.class_id,
        });
      }
    }
  }

  best
}

/// 包装一个已加载的模型，每次检测只返回最佳的一个框
pub struct YoloDetection<M> {
  model: M,
}

impl<M> YoloDetection<M>
where
  M: Model<Output = Vec<DetectResult>>,
{
  pub fn new(model: M) -> Self {
    Self { model }
  }

  /// 运行推理并归约为最佳检测
  ///
  /// 引擎产生的错误原样向上传递。
  pub fn detect(&self, frame: &M::Input) -> Result<Option<BestBox>, M::Error> {
    let groups = self.model.infer(frame)?;
    let best = select_best(&groups);
    debug!(
      "候选组数: {}, 最佳检测: {:?}",
      groups.len(),
      best.map(|b| (b.rect, b.confidence))
    );
    Ok(best)
  }

  pub fn model(&self) -> &M {
    &self.model
  }
}

impl<Frame: AsNhwcFrame> YoloDetection<YoloOnnx<Frame>> {
  /// 立即加载 ONNX 模型
  pub fn from_path<P: AsRef<Path>>(model_path: P) -> Result<Self, YoloOnnxError> {
    let model = YoloOnnxBuilder::new(model_path.as_ref()).build()?;
    Ok(Self::new(model))
  }
}
