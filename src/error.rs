// 该文件是 Saoma （扫码） 项目的一部分。
// src/error.rs - 对外错误分类
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

//! # 错误分类
//!
//! 调用方只会看到 [`ScannerError`] 中的几种错误。设备层和检测器的错误在会话控制器
//! 中被映射到这里：启动和缩放的失败同步返回给调用方，会话运行中的检测错误作为
//! 错误事件异步发出，停止操作从不报错。

use serde::{Serialize, Serializer, ser::SerializeStruct};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScannerError {
  #[error("扫码器已经启动，请先停止")]
  AlreadyStarted,
  #[error("没有找到符合要求的摄像头")]
  NoCamera,
  #[error("摄像头错误: {0}")]
  CameraError(String),
  #[error("扫码器已停止，无法设置缩放")]
  ZoomWhenStopped,
  #[error("缩放错误: {0}")]
  ZoomError(String),
  #[error("条码识别错误: {0}")]
  BarcodeError(String),
  #[error("无效的缩放比例: {0}")]
  InvalidZoomScale(String),
  #[error("未知错误: {0}")]
  Generic(String),
}

impl ScannerError {
  /// 稳定的错误编码，供调用方匹配
  pub fn code(&self) -> &'static str {
    match self {
      ScannerError::AlreadyStarted => "ALREADY_STARTED",
      ScannerError::NoCamera => "NO_CAMERA",
      ScannerError::CameraError(_) => "CAMERA_ERROR",
      ScannerError::ZoomWhenStopped => "SET_SCALE_WHEN_STOPPED",
      ScannerError::ZoomError(_) => "ZOOM_ERROR",
      ScannerError::BarcodeError(_) => "BARCODE_ERROR",
      // 缩放参数无效属于通用的输入错误
      ScannerError::InvalidZoomScale(_) | ScannerError::Generic(_) => "GENERIC_ERROR",
    }
  }

  pub fn generic(detail: impl std::fmt::Display) -> Self {
    ScannerError::Generic(detail.to_string())
  }
}

impl Serialize for ScannerError {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut state = serializer.serialize_struct("ScannerError", 2)?;
    state.serialize_field("code", self.code())?;
    state.serialize_field("message", &self.to_string())?;
    state.end()
  }
}
