// 该文件是 Ringsight （寻环） 项目的一部分。
// src/model/yolo_onnx.rs - ONNX YOLO 模型
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

use image::{GenericImageView, ImageBuffer, Rgb, imageops};
use thiserror::Error;
use tracing::{debug, error, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::AsNhwcFrame,
  model::{DetectItem, DetectResult, Model, nms::nms},
};

const YOLO_INPUT_SIZE: u32 = 640;
// YOLO 的最大下采样步长
const YOLO_MIN_INPUT_SIZE: u32 = 32;
const YOLO_CONFIDENCE: f32 = 0.25;
const YOLO_IOU: f32 = 0.7;
const YOLO_MAX_DET: usize = 300;
const YOLO_PAD_VALUE: f32 = 114.0 / 255.0;
// 端到端输出每行: x1, y1, x2, y2, score, class
const YOLO_END_TO_END_FEATURES: usize = 6;

// 已优化的可运行计划
type YoloRunner = Box<dyn Fn(TVec<TValue>) -> TractResult<TVec<TValue>>>;

#[derive(Error, Debug)]
pub enum YoloOnnxError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(String),
  #[error("模型加载错误: {0}, 错误: {1:#}")]
  ModelLoad(String, TractError),
  #[error("推理错误: {0:#}")]
  Inference(TractError),
  #[error("输入帧无效: {0}")]
  InvalidFrame(String),
  #[error("模型输出形状不符合预期: {0}")]
  UnexpectedOutput(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型输入边长无效: {0}，至少为 {min}", min = YOLO_MIN_INPUT_SIZE)]
  InvalidInputSize(u32),
}

impl From<TractError> for YoloOnnxError {
  fn from(err: TractError) -> Self {
    YoloOnnxError::Inference(err)
  }
}

/// 后处理参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Thresholds {
  pub confidence: f32,
  pub iou: f32,
  pub max_det: usize,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      confidence: YOLO_CONFIDENCE,
      iou: YOLO_IOU,
      max_det: YOLO_MAX_DET,
    }
  }
}

/// 基于 tract 的 YOLO 检测模型，输入为任意尺寸的 RGB 帧
pub struct YoloOnnx<Frame> {
  runner: YoloRunner,
  input_size: u32,
  thresholds: Thresholds,
  _phantom: std::marker::PhantomData<Frame>,
}

pub struct YoloOnnxBuilder {
  model_path: PathBuf,
  input_size: u32,
  thresholds: Thresholds,
}

impl FromUrlWithScheme for YoloOnnxBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for YoloOnnxBuilder {
  type Error = YoloOnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!("模型路径必须使用 {} 方案, 实际为 {}", Self::SCHEME, url.scheme());
      return Err(YoloOnnxError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(YoloOnnxBuilder::new(crate::url_file_path(url)))
  }
}

impl YoloOnnxBuilder {
  pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
    YoloOnnxBuilder {
      model_path: model_path.into(),
      input_size: YOLO_INPUT_SIZE,
      thresholds: Thresholds::default(),
    }
  }

  /// 模型输入边长（正方形），需与导出时一致
  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.thresholds.confidence = confidence;
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    self.thresholds.iou = iou;
    self
  }

  pub fn max_det(mut self, max_det: usize) -> Self {
    self.thresholds.max_det = max_det;
    self
  }

  pub fn build<Frame>(self) -> Result<YoloOnnx<Frame>, YoloOnnxError> {
    if self.input_size < YOLO_MIN_INPUT_SIZE {
      error!("模型输入边长过小: {}", self.input_size);
      return Err(YoloOnnxError::InvalidInputSize(self.input_size));
    }

    let path = self.model_path.display().to_string();
    if !self.model_path.is_file() {
      error!("模型文件不存在: {}", path);
      return Err(YoloOnnxError::ModelNotFound(path));
    }

    info!("加载模型文件: {}", path);
    let size = self.input_size as usize;
    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .and_then(|model| {
        model.with_input_fact(
          0,
          InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
        )
      })
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(|e| YoloOnnxError::ModelLoad(path.clone(), e))?;
    let runner: YoloRunner = Box::new(move |inputs: TVec<TValue>| plan.run(inputs));
    info!("模型加载完成");

    debug!("模型输入尺寸: {}x{}", self.input_size, self.input_size);
    debug!("后处理参数: {:?}", self.thresholds);

    Ok(YoloOnnx {
      runner,
      input_size: self.input_size,
      thresholds: self.thresholds,
      _phantom: std::marker::PhantomData,
    })
  }
}

impl<Frame: AsNhwcFrame> Model for YoloOnnx<Frame> {
  type Input = Frame;
  type Output = Vec<DetectResult>;
  type Error = YoloOnnxError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (width, height) = input.dimensions();
    if width == 0 || height == 0 {
      return Err(YoloOnnxError::InvalidFrame(format!(
        "空图像 {}x{}",
        width, height
      )));
    }
    let image = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(width, height, input.as_nhwc())
      .ok_or_else(|| {
        YoloOnnxError::InvalidFrame(format!(
          "像素数据长度 {} 与 {}x{} 不符",
          input.as_nhwc().len(),
          width,
          height
        ))
      })?;

    debug!("预处理输入帧 {}x{}", width, height);
    let letterbox = Letterbox::new(width, height, self.input_size);
    let tensor = letterbox.apply(&image);

    debug!("执行模型推理");
    let outputs = (self.runner)(tvec!(tensor.into()))?;

    let output = outputs
      .first()
      .ok_or_else(|| YoloOnnxError::UnexpectedOutput("模型没有输出".to_string()))?;
    let output = output.to_array_view::<f32>()?;
    debug!("模型输出形状: {:?}", output.shape());

    let result = decode_output(output, &letterbox, &self.thresholds)?;
    debug!("检测到 {} 个物体", result.len());

    Ok(vec![result])
  }
}

/// 保持宽高比的缩放与居中填充
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Letterbox {
  gain: f32,
  pad_x: f32,
  pad_y: f32,
  resized: (u32, u32),
  original: (u32, u32),
  size: u32,
}

impl Letterbox {
  pub(crate) fn new(width: u32, height: u32, size: u32) -> Self {
    let gain = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * gain).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * gain).round() as u32).clamp(1, size);

    let pad_x = ((size - new_w) as f32 / 2.0 - 0.1).round().max(0.0);
    let pad_y = ((size - new_h) as f32 / 2.0 - 0.1).round().max(0.0);

    Self {
      gain,
      pad_x,
      pad_y,
      resized: (new_w, new_h),
      original: (width, height),
      size,
    }
  }

  /// 生成 NCHW、归一化到 [0, 1] 的输入张量
  pub(crate) fn apply<I>(&self, image: &I) -> Tensor
  where
    I: GenericImageView<Pixel = Rgb<u8>>,
  {
    let (new_w, new_h) = self.resized;
    let resized = imageops::resize(image, new_w, new_h, imageops::FilterType::Triangle);
    let left = self.pad_x as usize;
    let top = self.pad_y as usize;
    let size = self.size as usize;

    tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
      if x < left || y < top {
        return YOLO_PAD_VALUE;
      }
      let (rx, ry) = ((x - left) as u32, (y - top) as u32);
      if rx >= new_w || ry >= new_h {
        return YOLO_PAD_VALUE;
      }
      resized.get_pixel(rx, ry)[channel] as f32 / 255.0
    })
    .into_tensor()
  }

  /// 将模型输入空间的 xyxy 框映射回原图并裁剪到图像范围
  pub(crate) fn to_original(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (width, height) = (self.original.0 as f32, self.original.1 as f32);
    [
      ((bbox[0] - self.pad_x) / self.gain).clamp(0.0, width),
      ((bbox[1] - self.pad_y) / self.gain).clamp(0.0, height),
      ((bbox[2] - self.pad_x) / self.gain).clamp(0.0, width),
      ((bbox[3] - self.pad_y) / self.gain).clamp(0.0, height),
    ]
  }
}

/// 解析模型输出
///
/// 支持两种布局：
/// - `[1, 4 + nc, N]` 原始检测头，需要置信度过滤与 NMS；
/// - `[1, N, 6]` 端到端输出，模型内部已经完成抑制。
pub(crate) fn decode_output(
  output: tract_ndarray::ArrayViewD<f32>,
  letterbox: &Letterbox,
  thresholds: &Thresholds,
) -> Result<DetectResult, YoloOnnxError> {
  let shape = format!("{:?}", output.shape());
  let output = output
    .into_dimensionality::<tract_ndarray::Ix3>()
    .map_err(|_| YoloOnnxError::UnexpectedOutput(shape.clone()))?;
  let (batch, rows, cols) = output.dim();
  if batch != 1 {
    return Err(YoloOnnxError::UnexpectedOutput(shape));
  }

  let items = if cols == YOLO_END_TO_END_FEATURES {
    debug!("端到端输出: {} 行", rows);
    let mut items = Vec::new();
    for n in 0..rows {
      if items.len() >= thresholds.max_det {
        break;
      }
      let score = output[[0, n, 4]];
      if score.is_nan() || score <= thresholds.confidence {
        continue;
      }
      let bbox = [
        output[[0, n, 0]],
        output[[0, n, 1]],
        output[[0, n, 2]],
        output[[0, n, 3]],
      ];
      items.push(DetectItem {
        class_id: output[[0, n, 5]].max(0.0) as u32,
        score,
        bbox: letterbox.to_original(bbox),
      });
    }
    items
  } else {
    if rows <= 4 {
      return Err(YoloOnnxError::UnexpectedOutput(shape));
    }
    let num_classes = rows - 4;
    debug!("原始检测头输出: {} 个类别, {} 个锚点", num_classes, cols);

    let mut candidates = Vec::new();
    for anchor in 0..cols {
      let mut best_score = f32::NEG_INFINITY;
      let mut best_class = 0usize;
      for class in 0..num_classes {
        let score = output[[0, 4 + class, anchor]];
        if score > best_score {
          best_score = score;
          best_class = class;
        }
      }

      if best_score.is_nan() || best_score <= thresholds.confidence {
        continue;
      }

      let cx = output[[0, 0, anchor]];
      let cy = output[[0, 1, anchor]];
      let w = output[[0, 2, anchor]];
      let h = output[[0, 3, anchor]];

      candidates.push(DetectItem {
        class_id: best_class as u32,
        score: best_score,
        bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
      });
    }
    debug!("NMS 前候选数: {}", candidates.len());

    nms(candidates, thresholds.iou, thresholds.max_det)
      .into_iter()
      .map(|item| DetectItem {
        bbox: letterbox.to_original(item.bbox),
        ..item
      })
      .collect()
  };

  Ok(DetectResult::from(items))
}
