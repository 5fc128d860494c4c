// 该文件是 Ringsight （寻环） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{Rgb, RgbImage};

use crate::input::AsNhwcFrame;

const RGB_CHANNELS: usize = 3;

/// 一帧解码后的 RGB 图像，按行优先的 HWC 顺序存放 8 位像素。
///
/// 帧的尺寸就是原图尺寸，缩放与填充由推理引擎内部完成。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbNhwcFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  /// 创建全零帧
  pub fn with_shape(height: usize, width: usize) -> Self {
    let size = RGB_CHANNELS * width * height;
    Self {
      width: width as u32,
      height: height as u32,
      data: vec![0u8; size].into_boxed_slice(),
    }
  }

  pub fn height(&self) -> usize {
    self.height as usize
  }

  pub fn width(&self) -> usize {
    self.width as usize
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn to_image(&self) -> RgbImage {
    RgbImage::from_fn(self.width, self.height, |x, y| {
      let index = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
      Rgb([self.data[index], self.data[index + 1], self.data[index + 2]])
    })
  }
}

impl From<RgbImage> for RgbNhwcFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl AsNhwcFrame for RgbNhwcFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keeps_hwc_layout_from_image() {
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(2, 1, Rgb([10, 20, 30]));
    let frame = RgbNhwcFrame::from(image.clone());

    assert_eq!(frame.dimensions(), (3, 2));
    let index = (3 + 2) * 3;
    assert_eq!(&frame.as_nhwc()[index..index + 3], &[10, 20, 30]);
    assert_eq!(frame.to_image(), image);
  }

  #[test]
  fn empty_frame_is_reported() {
    let frame = RgbNhwcFrame::with_shape(0, 0);
    assert!(frame.is_empty());
    assert_eq!(frame.dimensions(), (0, 0));
  }
}
