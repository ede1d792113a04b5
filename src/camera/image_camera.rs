// 该文件是 Saoma （扫码） 项目的一部分。
// src/camera/image_camera.rs - 图像文件摄像头
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

//! # 图像文件摄像头
//!
//! 把一张静态图片当作摄像头，按固定间隔反复输出同一帧。闪光灯只记录状态，
//! 缩放通过裁剪画面中心再放大回原尺寸模拟。
//!
//! ```text
//! image:///path/to/code.png?facing=back&interval=100&max_zoom=5&torch=true
//! ```

use std::{
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
  thread,
  time::Duration,
};

use image::{ImageReader, RgbImage, imageops};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use super::{
  CameraDevice, CameraError, CameraFacing, CameraProvider, CaptureConfig, PermissionState,
  TorchState, next_texture_id,
};
use crate::{FromUrl, FromUrlWithScheme, geometry::Size};

const DEFAULT_INTERVAL_MS: u64 = 100;
const DEFAULT_MAX_ZOOM: f64 = 5.0;
const MIN_ZOOM: f64 = 1.0;

#[derive(Error, Debug)]
pub enum ImageCameraError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的参数 {0}: {1}")]
  InvalidQuery(String, String),
}

/// 以图像文件为画面的摄像头
#[derive(Debug, Clone)]
pub struct ImageCamera {
  path: PathBuf,
  facing: CameraFacing,
  interval: Duration,
  max_zoom: f64,
  has_torch: bool,
}

impl FromUrlWithScheme for ImageCamera {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageCamera {
  type Error = ImageCameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageCameraError::SchemeMismatch);
    }

    let mut camera = ImageCamera::new(url.path());
    for (key, value) in url.query_pairs() {
      let invalid = || ImageCameraError::InvalidQuery(key.to_string(), value.to_string());
      match key.as_ref() {
        "facing" => camera.facing = CameraFacing::from_name(&value).ok_or_else(invalid)?,
        "interval" => {
          camera.interval = Duration::from_millis(value.parse().map_err(|_| invalid())?)
        }
        "max_zoom" => {
          let max_zoom: f64 = value.parse().map_err(|_| invalid())?;
          if !(max_zoom >= MIN_ZOOM) {
            return Err(invalid());
          }
          camera.max_zoom = max_zoom;
        }
        "torch" => camera.has_torch = value.parse().map_err(|_| invalid())?,
        _ => debug!("忽略未知参数: {}={}", key, value),
      }
    }

    Ok(camera)
  }
}

impl ImageCamera {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      facing: CameraFacing::Back,
      interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
      max_zoom: DEFAULT_MAX_ZOOM,
      has_torch: true,
    }
  }

  pub fn with_facing(mut self, facing: CameraFacing) -> Self {
    self.facing = facing;
    self
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  pub fn with_max_zoom(mut self, max_zoom: f64) -> Self {
    self.max_zoom = max_zoom.max(MIN_ZOOM);
    self
  }

  pub fn with_torch(mut self, has_torch: bool) -> Self {
    self.has_torch = has_torch;
    self
  }
}

impl CameraProvider for ImageCamera {
  type Device = ImageCameraDevice;

  fn permission_state(&self) -> PermissionState {
    match std::fs::metadata(&self.path) {
      Ok(_) => PermissionState::Authorized,
      Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => PermissionState::Denied,
      Err(_) => PermissionState::Undetermined,
    }
  }

  fn request_permission(&mut self) -> bool {
    self.permission_state() == PermissionState::Authorized
  }

  fn open(&mut self, config: &CaptureConfig) -> Result<Self::Device, CameraError> {
    if config.facing != self.facing {
      return Err(CameraError::NoDevice(config.facing));
    }

    info!("打开图像摄像头: {}", self.path.display());
    let image = ImageReader::open(&self.path)?.decode()?.to_rgb8();
    if let Some(timeout) = config.timeout {
      debug!("图像摄像头忽略结果超时: {:?}", timeout);
    }

    Ok(ImageCameraDevice {
      texture_id: next_texture_id(),
      image: Arc::new(image),
      interval: self.interval,
      max_zoom: self.max_zoom,
      torch: if self.has_torch {
        TorchState::Off
      } else {
        TorchState::Unavailable
      },
      zoom: Arc::new(AtomicU64::new(MIN_ZOOM.to_bits())),
      released: Arc::new(AtomicBool::new(false)),
    })
  }
}

pub struct ImageCameraDevice {
  texture_id: i64,
  image: Arc<RgbImage>,
  interval: Duration,
  max_zoom: f64,
  torch: TorchState,
  zoom: Arc<AtomicU64>,
  released: Arc<AtomicBool>,
}

impl ImageCameraDevice {
  fn store_zoom(&self, scale: f64) -> f64 {
    self.zoom.store(scale.to_bits(), Ordering::Release);
    scale
  }
}

impl CameraDevice for ImageCameraDevice {
  type Frames = ImageFrames;

  fn texture_id(&self) -> i64 {
    self.texture_id
  }

  fn size(&self) -> Size {
    Size::new(self.image.width(), self.image.height())
  }

  fn torch_state(&self) -> TorchState {
    self.torch
  }

  fn set_torch(&mut self, on: bool) -> Result<TorchState, CameraError> {
    if self.torch == TorchState::Unavailable {
      return Err(CameraError::Unsupported("闪光灯".to_string()));
    }
    self.torch = if on { TorchState::On } else { TorchState::Off };
    Ok(self.torch)
  }

  fn set_zoom(&mut self, scale: f64) -> Result<f64, CameraError> {
    if !(MIN_ZOOM..=self.max_zoom).contains(&scale) {
      return Err(CameraError::ZoomOutOfRange {
        requested: scale,
        min: MIN_ZOOM,
        max: self.max_zoom,
      });
    }
    Ok(self.store_zoom(scale))
  }

  fn reset_zoom(&mut self) -> Result<f64, CameraError> {
    Ok(self.store_zoom(MIN_ZOOM))
  }

  fn frames(&mut self) -> Result<Self::Frames, CameraError> {
    if self.released.load(Ordering::Acquire) {
      return Err(CameraError::Device("设备已释放".to_string()));
    }
    Ok(ImageFrames {
      image: self.image.clone(),
      interval: self.interval,
      zoom: self.zoom.clone(),
      released: self.released.clone(),
      first: true,
    })
  }

  fn release(&mut self) -> Result<(), CameraError> {
    self.released.store(true, Ordering::Release);
    Ok(())
  }
}

/// 图像摄像头的帧流，设备释放后结束
pub struct ImageFrames {
  image: Arc<RgbImage>,
  interval: Duration,
  zoom: Arc<AtomicU64>,
  released: Arc<AtomicBool>,
  first: bool,
}

impl ImageFrames {
  fn zoomed(&self) -> RgbImage {
    let scale = f64::from_bits(self.zoom.load(Ordering::Acquire));
    if scale <= MIN_ZOOM {
      return self.image.as_ref().clone();
    }

    let (width, height) = self.image.dimensions();
    let crop_w = ((width as f64 / scale).round() as u32).max(1);
    let crop_h = ((height as f64 / scale).round() as u32).max(1);
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;
    let cropped = imageops::crop_imm(self.image.as_ref(), x, y, crop_w, crop_h).to_image();
    imageops::resize(&cropped, width, height, imageops::FilterType::Triangle)
  }
}

impl Iterator for ImageFrames {
  type Item = Result<RgbImage, CameraError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.first {
      self.first = false;
    } else {
      thread::sleep(self.interval);
    }

    if self.released.load(Ordering::Acquire) {
      return None;
    }
    Some(Ok(self.zoomed()))
  }
}
