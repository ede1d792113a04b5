// 该文件是 Saoma （扫码） 项目的一部分。
// src/detector/qr.rs - 二维码检测器
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

use image::{RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

use super::{DetectOptions, Detector};
use crate::{
  barcode::{Barcode, BarcodeFormat},
  geometry::Point,
};

#[derive(Error, Debug)]
pub enum QrDetectorError {
  #[error("图像为空: {0}x{1}")]
  EmptyImage(u32, u32),
}

/// 基于 rqrr 的二维码检测器
#[derive(Debug, Clone, Default)]
pub struct QrDetector;

impl QrDetector {
  pub fn new() -> Self {
    Self
  }
}

/// rqrr 给出的角点随二维码旋转，这里换成轴对齐的包围盒角点
fn axis_aligned_corners(bounds: &[rqrr::Point; 4]) -> [Point; 4] {
  let min_x = bounds.iter().map(|p| p.x).min().unwrap_or(0) as f64;
  let max_x = bounds.iter().map(|p| p.x).max().unwrap_or(0) as f64;
  let min_y = bounds.iter().map(|p| p.y).min().unwrap_or(0) as f64;
  let max_y = bounds.iter().map(|p| p.y).max().unwrap_or(0) as f64;

  [
    Point::new(min_x, min_y),
    Point::new(max_x, min_y),
    Point::new(max_x, max_y),
    Point::new(min_x, max_y),
  ]
}

impl Detector for QrDetector {
  type Error = QrDetectorError;

  fn detect(&self, image: &RgbImage, options: &DetectOptions) -> Result<Vec<Barcode>, Self::Error> {
    if !options.formats.accepts(BarcodeFormat::QrCode) {
      return Ok(Vec::new());
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(QrDetectorError::EmptyImage(width, height));
    }

    let gray = imageops::grayscale(image);
    let stride = width as usize;
    let raw = gray.as_raw();
    let mut prepared =
      rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
        raw[y * stride + x]
      });

    let mut barcodes = Vec::new();
    for grid in prepared.detect_grids() {
      match grid.decode() {
        Ok((_meta, content)) => {
          barcodes.push(Barcode::new(
            BarcodeFormat::QrCode,
            content,
            axis_aligned_corners(&grid.bounds),
          ));
        }
        Err(e) => debug!("二维码解码失败: {:?}", e),
      }
    }

    Ok(barcodes)
  }
}
