// 该文件是 Saoma （扫码） 项目的一部分。
// src/camera.rs - 摄像头采集源
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

use std::{
  sync::atomic::{AtomicI64, Ordering},
  time::Duration,
};

use image::RgbImage;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::{FromUrl, geometry::Size};

#[cfg(feature = "read_image_file")]
mod image_camera;
#[cfg(feature = "read_image_file")]
pub use self::image_camera::{ImageCamera, ImageCameraDevice, ImageCameraError, ImageFrames};

#[cfg(feature = "v4l_camera")]
mod v4l_camera;
#[cfg(feature = "v4l_camera")]
pub use self::v4l_camera::{V4lCamera, V4lCameraDevice, V4lCameraError, V4lFrames};

/// 摄像头朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraFacing {
  Front,
  #[default]
  Back,
}

impl CameraFacing {
  pub fn code(self) -> i32 {
    match self {
      CameraFacing::Front => 0,
      CameraFacing::Back => 1,
    }
  }

  /// 未知编码按后置摄像头处理
  pub fn from_code(code: i64) -> Self {
    match code {
      0 => CameraFacing::Front,
      _ => CameraFacing::Back,
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "front" => Some(CameraFacing::Front),
      "back" => Some(CameraFacing::Back),
      _ => None,
    }
  }
}

/// 闪光灯状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TorchState {
  Unavailable,
  Off,
  On,
}

impl TorchState {
  pub fn code(self) -> i32 {
    match self {
      TorchState::Unavailable => -1,
      TorchState::Off => 0,
      TorchState::On => 1,
    }
  }

  pub fn is_on(self) -> bool {
    self == TorchState::On
  }
}

impl Serialize for TorchState {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i32(self.code())
  }
}

/// 摄像头权限状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionState {
  Undetermined,
  Authorized,
  Denied,
}

impl PermissionState {
  pub fn code(self) -> i32 {
    match self {
      PermissionState::Undetermined => 0,
      PermissionState::Authorized => 1,
      PermissionState::Denied => 2,
    }
  }
}

/// 打开摄像头时传给设备的参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureConfig {
  pub facing: CameraFacing,
  pub torch: bool,
  /// 结果超时，`None` 表示不限制，由设备自行解释
  pub timeout: Option<Duration>,
}

#[derive(Error, Debug)]
pub enum CameraError {
  #[error("没有 {0:?} 朝向的摄像头")]
  NoDevice(CameraFacing),
  #[error("没有摄像头访问权限")]
  PermissionDenied,
  #[error("设备错误: {0}")]
  Device(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("设备不支持: {0}")]
  Unsupported(String),
  #[error("缩放比例 {requested} 超出范围 [{min}, {max}]")]
  ZoomOutOfRange { requested: f64, min: f64, max: f64 },
  #[error("{0}")]
  Other(String),
}

/// 摄像头提供者，负责权限与设备的获取
pub trait CameraProvider: Send {
  type Device: CameraDevice;

  fn permission_state(&self) -> PermissionState;
  fn request_permission(&mut self) -> bool;
  fn open(&mut self, config: &CaptureConfig) -> Result<Self::Device, CameraError>;
}

/// 已打开的摄像头设备
///
/// 帧流由 [`CameraDevice::frames`] 交给采集线程；闪光灯与缩放由控制线程操作。
/// 设备释放后帧流应尽快结束。
pub trait CameraDevice: Send + 'static {
  type Frames: Iterator<Item = Result<RgbImage, CameraError>> + Send + 'static;

  fn texture_id(&self) -> i64;
  fn size(&self) -> Size;
  fn torch_state(&self) -> TorchState;
  fn set_torch(&mut self, on: bool) -> Result<TorchState, CameraError>;
  /// 返回设备实际采用的缩放比例
  fn set_zoom(&mut self, scale: f64) -> Result<f64, CameraError>;
  fn reset_zoom(&mut self) -> Result<f64, CameraError>;
  fn frames(&mut self) -> Result<Self::Frames, CameraError>;
  fn release(&mut self) -> Result<(), CameraError>;
}

static TEXTURE_COUNTER: AtomicI64 = AtomicI64::new(1);

/// 进程内唯一的纹理编号
pub fn next_texture_id() -> i64 {
  TEXTURE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Error, Debug)]
pub enum CameraUrlError {
  #[cfg(feature = "read_image_file")]
  #[error("图像摄像头错误: {0}")]
  ImageCameraError(#[from] ImageCameraError),
  #[cfg(feature = "v4l_camera")]
  #[error("V4L 摄像头错误: {0}")]
  V4lCameraError(#[from] V4lCameraError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 按 URL 方案选择的摄像头
pub enum CameraWrapper {
  #[cfg(feature = "read_image_file")]
  Image(ImageCamera),
  #[cfg(feature = "v4l_camera")]
  V4l(V4lCamera),
}

impl FromUrl for CameraWrapper {
  type Error = CameraUrlError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageCamera::SCHEME {
        return Ok(CameraWrapper::Image(ImageCamera::from_url(url)?));
      }
    }
    #[cfg(feature = "v4l_camera")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == V4lCamera::SCHEME {
        return Ok(CameraWrapper::V4l(V4lCamera::from_url(url)?));
      }
    }
    let _ = url;
    Err(CameraUrlError::SchemeMismatch)
  }
}

pub enum CameraDeviceWrapper {
  #[cfg(feature = "read_image_file")]
  Image(ImageCameraDevice),
  #[cfg(feature = "v4l_camera")]
  V4l(V4lCameraDevice),
}

pub enum CameraFramesWrapper {
  #[cfg(feature = "read_image_file")]
  Image(ImageFrames),
  #[cfg(feature = "v4l_camera")]
  V4l(V4lFrames),
}

impl CameraProvider for CameraWrapper {
  type Device = CameraDeviceWrapper;

  fn permission_state(&self) -> PermissionState {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraWrapper::Image(ref camera) => camera.permission_state(),
      #[cfg(feature = "v4l_camera")]
      CameraWrapper::V4l(ref camera) => camera.permission_state(),
    }
  }

  fn request_permission(&mut self) -> bool {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraWrapper::Image(ref mut camera) => camera.request_permission(),
      #[cfg(feature = "v4l_camera")]
      CameraWrapper::V4l(ref mut camera) => camera.request_permission(),
    }
  }

  fn open(&mut self, config: &CaptureConfig) -> Result<Self::Device, CameraError> {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraWrapper::Image(ref mut camera) => camera.open(config).map(CameraDeviceWrapper::Image),
      #[cfg(feature = "v4l_camera")]
      CameraWrapper::V4l(ref mut camera) => camera.open(config).map(CameraDeviceWrapper::V4l),
    }
  }
}

impl CameraDevice for CameraDeviceWrapper {
  type Frames = CameraFramesWrapper;

  fn texture_id(&self) -> i64 {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraDeviceWrapper::Image(ref device) => device.texture_id(),
      #[cfg(feature = "v4l_camera")]
      CameraDeviceWrapper::V4l(ref device) => device.texture_id(),
    }
  }

  fn size(&self) -> Size {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraDeviceWrapper::Image(ref device) => device.size(),
      #[cfg(feature = "v4l_camera")]
      CameraDeviceWrapper::V4l(ref device) => device.size(),
    }
  }

  fn torch_state(&self) -> TorchState {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraDeviceWrapper::Image(ref device) => device.torch_state(),
      #[cfg(feature = "v4l_camera")]
      CameraDeviceWrapper::V4l(ref device) => device.torch_state(),
    }
  }

  fn set_torch(&mut self, on: bool) -> Result<TorchState, CameraError> {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraDeviceWrapper::Image(ref mut device) => device.set_torch(on),
      #[cfg(feature = "v4l_camera")]
      CameraDeviceWrapper::V4l(ref mut device) => device.set_torch(on),
    }
  }

  fn set_zoom(&mut self, scale: f64) -> Result<f64, CameraError> {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraDeviceWrapper::Image(ref mut device) => device.set_zoom(scale),
      #[cfg(feature = "v4l_camera")]
      CameraDeviceWrapper::V4l(ref mut device) => device.set_zoom(scale),
    }
  }

  fn reset_zoom(&mut self) -> Result<f64, CameraError> {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraDeviceWrapper::Image(ref mut device) => device.reset_zoom(),
      #[cfg(feature = "v4l_camera")]
      CameraDeviceWrapper::V4l(ref mut device) => device.reset_zoom(),
    }
  }

  fn frames(&mut self) -> Result<Self::Frames, CameraError> {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraDeviceWrapper::Image(ref mut device) => device.frames().map(CameraFramesWrapper::Image),
      #[cfg(feature = "v4l_camera")]
      CameraDeviceWrapper::V4l(ref mut device) => device.frames().map(CameraFramesWrapper::V4l),
    }
  }

  fn release(&mut self) -> Result<(), CameraError> {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraDeviceWrapper::Image(ref mut device) => device.release(),
      #[cfg(feature = "v4l_camera")]
      CameraDeviceWrapper::V4l(ref mut device) => device.release(),
    }
  }
}

impl Iterator for CameraFramesWrapper {
  type Item = Result<RgbImage, CameraError>;

  fn next(&mut self) -> Option<Self::Item> {
    match *self {
      #[cfg(feature = "read_image_file")]
      CameraFramesWrapper::Image(ref mut frames) => frames.next(),
      #[cfg(feature = "v4l_camera")]
      CameraFramesWrapper::V4l(ref mut frames) => frames.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn facing_codes_default_to_back() {
    assert_eq!(CameraFacing::from_code(0), CameraFacing::Front);
    assert_eq!(CameraFacing::from_code(1), CameraFacing::Back);
    assert_eq!(CameraFacing::from_code(7), CameraFacing::Back);
    assert_eq!(CameraFacing::from_name("front"), Some(CameraFacing::Front));
    assert_eq!(CameraFacing::from_name("side"), None);
  }

  #[test]
  fn texture_ids_are_unique() {
    let a = next_texture_id();
    let b = next_texture_id();
    assert_ne!(a, b);
  }

  #[cfg(feature = "read_image_file")]
  #[test]
  fn wrapper_dispatches_to_image_camera() {
    let path = std::env::temp_dir().join(format!("saoma-wrapper-{}.png", std::process::id()));
    RgbImage::new(8, 6).save(&path).unwrap();
    let url = url::Url::parse(&format!("image://{}?interval=1", path.display())).unwrap();

    let mut camera = CameraWrapper::from_url(&url).unwrap();
    assert_eq!(camera.permission_state(), PermissionState::Authorized);
    let mut device = camera.open(&CaptureConfig::default()).unwrap();
    assert_eq!(device.size(), Size::new(8, 6));
    assert_eq!(device.set_torch(true).unwrap(), TorchState::On);
    assert_eq!(device.set_zoom(2.0).unwrap(), 2.0);

    let mut frames = device.frames().unwrap();
    assert!(matches!(frames.next(), Some(Ok(_))));
    device.release().unwrap();
    assert!(frames.next().is_none());
    let _ = std::fs::remove_file(path);
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("rtsp://127.0.0.1/stream").unwrap();
    assert!(matches!(
      CameraWrapper::from_url(&url),
      Err(CameraUrlError::SchemeMismatch)
    ));
  }
}
