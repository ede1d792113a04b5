// 该文件是 Saoma （扫码） 项目的一部分。
// src/options.rs - 扫码器选项
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

use std::time::Duration;

use crate::{frame::DEFAULT_JPEG_QUALITY, geometry::ScanWindow};

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// 扫码器实例级别的选项，在创建控制器时确定
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerOptions {
  /// 停止时等待采集线程退出的最长时间
  pub stop_timeout: Duration,
  pub jpeg_quality: u8,
  pub scan_window: Option<ScanWindow>,
}

impl Default for ScannerOptions {
  fn default() -> Self {
    Self {
      stop_timeout: DEFAULT_STOP_TIMEOUT,
      jpeg_quality: DEFAULT_JPEG_QUALITY,
      scan_window: None,
    }
  }
}

impl ScannerOptions {
  pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
    self.stop_timeout = stop_timeout;
    self
  }

  pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
    self.jpeg_quality = quality.clamp(1, 100);
    self
  }

  pub fn with_scan_window(mut self, scan_window: Option<ScanWindow>) -> Self {
    self.scan_window = scan_window;
    self
  }
}
