// 该文件是 Saoma （扫码） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::{RgbImage, codecs::jpeg::JpegEncoder};
use serde::Serialize;

use crate::geometry::Size;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// 摄像头一次采集得到的帧
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
  index: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64) -> Self {
    Self { image, index }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn size(&self) -> Size {
    Size::new(self.width(), self.height())
  }

  pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    encode_jpeg(&self.image, quality)
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self::new(image, 0)
  }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
  let mut bytes = Vec::new();
  JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(image)?;
  Ok(bytes)
}

/// 随条码事件一同发出的帧信息，只有开启图像回传时才带 `bytes`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameImage {
  pub bytes: Option<Vec<u8>>,
  pub width: u32,
  pub height: u32,
}
