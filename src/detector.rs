// 该文件是 Saoma （扫码） 项目的一部分。
// src/detector.rs - 条码检测器
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

use image::RgbImage;

use crate::{
  barcode::{Barcode, FormatFilter},
  camera::CameraFacing,
};

#[cfg(feature = "detector_qr")]
mod qr;
#[cfg(feature = "detector_qr")]
pub use self::qr::{QrDetector, QrDetectorError};

/// 检测速度模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DetectionSpeed {
  /// 与上一次上报的内容相同时不再上报
  #[default]
  NoDuplicates,
  Normal,
  Unrestricted,
}

impl DetectionSpeed {
  pub fn code(self) -> i32 {
    match self {
      DetectionSpeed::NoDuplicates => 0,
      DetectionSpeed::Normal => 1,
      DetectionSpeed::Unrestricted => 2,
    }
  }

  pub fn from_code(code: i64) -> Option<Self> {
    match code {
      0 => Some(DetectionSpeed::NoDuplicates),
      1 => Some(DetectionSpeed::Normal),
      2 => Some(DetectionSpeed::Unrestricted),
      _ => None,
    }
  }
}

/// 单次检测的参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectOptions {
  pub formats: FormatFilter,
  /// 画面来自哪个朝向的摄像头，决定识别时的方向假设
  pub facing: CameraFacing,
}

/// 条码检测器
///
/// 返回的条码按检测器给出的顺序排列，角点顺序需满足 [`Barcode`] 的约定。
/// 检测器会在采集线程上被调用，因此需要 `Send + Sync`。
pub trait Detector: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  fn detect(&self, image: &RgbImage, options: &DetectOptions) -> Result<Vec<Barcode>, Self::Error>;
}
