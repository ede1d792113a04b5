// 该文件是 Saoma （扫码） 项目的一部分。
// src/assembler.rs - 逐帧识别结果组装
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

use std::fmt::Display;

use tracing::{debug, warn};

use crate::{
  barcode::Barcode,
  detector::DetectionSpeed,
  error::ScannerError,
  event::{BarcodeEvent, ScannerEvent},
  frame::{DEFAULT_JPEG_QUALITY, Frame, FrameImage},
  geometry::{ScanWindow, SharedScanWindow, Size, is_in_window},
};

/// 保留落在扫描窗口内的条码，顺序不变
pub fn filter_in_window(
  barcodes: Vec<Barcode>,
  frame_size: Size,
  window: Option<&ScanWindow>,
) -> Vec<Barcode> {
  barcodes
    .into_iter()
    .filter(|barcode| is_in_window(barcode, frame_size, window))
    .collect()
}

/// 把检测器输出和帧信息组装成事件
///
/// 每个会话持有一个组装器。扫描窗口在每帧开始时读取一次；图像回传策略在会话
/// 开始时确定，之后不再改变。
#[derive(Debug)]
pub struct DetectionAssembler {
  scan_window: SharedScanWindow,
  return_image: bool,
  jpeg_quality: u8,
  speed: DetectionSpeed,
  last_reported: Option<Vec<String>>,
}

impl DetectionAssembler {
  pub fn new(scan_window: SharedScanWindow, return_image: bool) -> Self {
    Self {
      scan_window,
      return_image,
      jpeg_quality: DEFAULT_JPEG_QUALITY,
      speed: DetectionSpeed::Unrestricted,
      last_reported: None,
    }
  }

  pub fn with_speed(mut self, speed: DetectionSpeed) -> Self {
    self.speed = speed;
    self
  }

  pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
    self.jpeg_quality = quality;
    self
  }

  /// 处理一帧，返回需要发出的事件（没有则为 `None`）
  pub fn assemble<E: Display>(
    &mut self,
    frame: &Frame,
    detected: Result<Vec<Barcode>, E>,
  ) -> Option<ScannerEvent> {
    let barcodes = match detected {
      Ok(barcodes) => barcodes,
      Err(e) => {
        warn!("第 {} 帧识别失败: {}", frame.index(), e);
        return Some(ScannerEvent::Error(ScannerError::BarcodeError(
          e.to_string(),
        )));
      }
    };

    let window = self.scan_window.get();
    let detected_count = barcodes.len();
    let barcodes = filter_in_window(barcodes, frame.size(), window.as_ref());
    if barcodes.is_empty() {
      if detected_count > 0 {
        debug!(
          "第 {} 帧的 {} 个条码均不在扫描窗口内",
          frame.index(),
          detected_count
        );
      }
      return None;
    }

    if self.is_duplicate(&barcodes) {
      debug!("第 {} 帧与上次结果相同，跳过", frame.index());
      return None;
    }

    Some(ScannerEvent::Barcode(BarcodeEvent {
      image: self.frame_image(frame),
      barcodes,
    }))
  }

  fn is_duplicate(&mut self, barcodes: &[Barcode]) -> bool {
    if self.speed != DetectionSpeed::NoDuplicates {
      return false;
    }

    let mut values: Vec<String> = barcodes
      .iter()
      .map(|barcode| match (barcode.raw_value(), barcode.raw_bytes()) {
        (Some(value), _) => value.to_string(),
        (None, Some(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
        (None, None) => String::new(),
      })
      .collect();
    values.sort();

    if self.last_reported.as_ref() == Some(&values) {
      return true;
    }
    self.last_reported = Some(values);
    false
  }

  fn frame_image(&self, frame: &Frame) -> FrameImage {
    let bytes = if self.return_image {
      match frame.encode_jpeg(self.jpeg_quality) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
          warn!("第 {} 帧 JPEG 编码失败: {}", frame.index(), e);
          None
        }
      }
    } else {
      None
    };

    FrameImage {
      bytes,
      width: frame.width(),
      height: frame.height(),
    }
  }
}
