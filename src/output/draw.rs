// 该文件是 Ringsight （寻环） 项目的一部分。
// src/output/draw.rs - 最佳检测结果可视化
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
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect as DrawRect};

use crate::{
  detector::{BestBox, Rect},
  frame::RgbNhwcFrame,
};

const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

pub struct Draw {
  thickness: i32,
  color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
      color: BOX_COLOR,
    }
  }
}

impl Draw {
  /// 在帧的副本上绘制最佳检测框，没有检测时原样返回
  pub fn draw_best(&self, frame: &RgbNhwcFrame, best: Option<&BestBox>) -> RgbImage {
    let mut image = frame.to_image();
    if let Some(best) = best {
      self.draw_rect(&mut image, best.rect);
    }
    image
  }

  // 向内逐像素收缩绘制，得到加粗的边框
  fn draw_rect(&self, image: &mut RgbImage, rect: Rect) {
    for inset in 0..self.thickness {
      let w = rect.w - 2 * inset;
      let h = rect.h - 2 * inset;
      if w <= 0 || h <= 0 {
        break;
      }
      let outline = DrawRect::at(rect.x + inset, rect.y + inset).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, outline, Rgb(self.color));
    }
  }
}
