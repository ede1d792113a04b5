// 该文件是 Saoma （扫码） 项目的一部分。
// src/camera/v4l_camera.rs - V4L 摄像头
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

//! # V4L 摄像头
//!
//! V4L2 设备没有朝向的概念，需要在 URL 中把朝向映射到设备路径：
//!
//! ```text
//! v4l://?back=/dev/video0&front=/dev/video2
//! ```
//!
//! 未给出任何映射时，`/dev/video0` 作为后置摄像头。缩放使用
//! `V4L2_CID_ZOOM_ABSOLUTE`，闪光灯使用 `V4L2_CID_FLASH_LED_MODE`，设备不提供对应控制项时
//! 相应功能不可用。

use std::{
  collections::HashMap,
  io::ErrorKind,
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;
use v4l::{
  FourCC,
  buffer::Type,
  control::{Control, Value},
  io::{mmap::Stream, traits::CaptureStream},
  video::Capture,
};

use super::{
  CameraDevice, CameraError, CameraFacing, CameraProvider, CaptureConfig, PermissionState,
  TorchState, next_texture_id,
};
use crate::{FromUrl, FromUrlWithScheme, geometry::Size};

const DEFAULT_DEVICE: &str = "/dev/video0";
const V4L2_CID_ZOOM_ABSOLUTE: u32 = 0x009a_090d;
const V4L2_CID_FLASH_LED_MODE: u32 = 0x009c_0901;
const V4L2_FLASH_LED_MODE_NONE: i64 = 0;
const V4L2_FLASH_LED_MODE_TORCH: i64 = 2;
const MAX_ZOOM_SCALE: f64 = 5.0;
const MIN_ZOOM_SCALE: f64 = 1.0;
const STREAM_BUFFERS: u32 = 2;

#[derive(Error, Debug)]
pub enum V4lCameraError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的摄像头朝向: {0}")]
  UnknownFacing(String),
}

/// 基于 V4L2 的摄像头
#[derive(Debug, Clone)]
pub struct V4lCamera {
  devices: HashMap<CameraFacing, PathBuf>,
}

impl FromUrlWithScheme for V4lCamera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lCamera {
  type Error = V4lCameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lCameraError::SchemeMismatch);
    }

    let mut devices = HashMap::new();
    for (key, value) in url.query_pairs() {
      let facing =
        CameraFacing::from_name(&key).ok_or_else(|| V4lCameraError::UnknownFacing(key.to_string()))?;
      devices.insert(facing, PathBuf::from(value.as_ref()));
    }

    // v4l:///dev/video0 形式
    if devices.is_empty() {
      let path = if url.path().is_empty() || url.path() == "/" {
        DEFAULT_DEVICE
      } else {
        url.path()
      };
      devices.insert(CameraFacing::Back, PathBuf::from(path));
    }

    Ok(V4lCamera { devices })
  }
}

impl V4lCamera {
  pub fn new() -> Self {
    Self {
      devices: HashMap::from([(CameraFacing::Back, PathBuf::from(DEFAULT_DEVICE))]),
    }
  }

  pub fn with_device(mut self, facing: CameraFacing, path: impl Into<PathBuf>) -> Self {
    self.devices.insert(facing, path.into());
    self
  }
}

impl Default for V4lCamera {
  fn default() -> Self {
    Self::new()
  }
}

fn counters_permission(path: &Path) -> Option<PermissionState> {
  match std::fs::OpenOptions::new().read(true).write(true).open(path) {
    Ok(_) => Some(PermissionState::Authorized),
    Err(e) if e.kind() == ErrorKind::PermissionDenied => Some(PermissionState::Denied),
    Err(_) => None,
  }
}

fn open_error(path: &Path, facing: CameraFacing, e: std::io::Error) -> CameraError {
  error!("无法打开 V4L 设备 {}: {}", path.display(), e);
  match e.kind() {
    ErrorKind::NotFound => CameraError::NoDevice(facing),
    ErrorKind::PermissionDenied => CameraError::PermissionDenied,
    _ => CameraError::Io(e),
  }
}

fn device_error(e: std::io::Error) -> CameraError {
  CameraError::Device(e.to_string())
}

impl CameraProvider for V4lCamera {
  type Device = V4lCameraDevice;

  fn permission_state(&self) -> PermissionState {
    let mut state = PermissionState::Undetermined;
    for path in self.devices.values() {
      match counters_permission(path) {
        Some(PermissionState::Authorized) => return PermissionState::Authorized,
        Some(other) => state = other,
        None => {}
      }
    }
    state
  }

  fn request_permission(&mut self) -> bool {
    self.permission_state() == PermissionState::Authorized
  }

  fn open(&mut self, config: &CaptureConfig) -> Result<Self::Device, CameraError> {
    let path = self
      .devices
      .get(&config.facing)
      .ok_or(CameraError::NoDevice(config.facing))?
      .clone();

    info!("打开 V4L 设备: {}", path.display());
    let device = v4l::Device::with_path(&path).map_err(|e| open_error(&path, config.facing, e))?;

    let mut format = device.format().map_err(device_error)?;
    let rgb = FourCC::new(b"RGB3");
    if format.fourcc != rgb {
      let mut wanted = format.clone();
      wanted.fourcc = rgb;
      match device.set_format(&wanted) {
        Ok(applied) => format = applied,
        Err(e) => debug!("设备不接受 RGB3 格式: {}", e),
      }
    }
    match format.fourcc.str() {
      Ok(fourcc) => info!("V4L 格式: {}x{} {}", format.width, format.height, fourcc),
      Err(_) => info!("V4L 格式: {}x{}", format.width, format.height),
    }

    if let Some(timeout) = config.timeout {
      debug!("V4L 设备忽略结果超时: {:?}", timeout);
    }

    let controls = device.query_controls().unwrap_or_else(|e| {
      warn!("无法查询设备控制项: {}", e);
      Vec::new()
    });
    let zoom = controls
      .iter()
      .find(|c| c.id == V4L2_CID_ZOOM_ABSOLUTE)
      .map(|c| (c.minimum, c.maximum));
    let has_flash = controls.iter().any(|c| c.id == V4L2_CID_FLASH_LED_MODE);

    Ok(V4lCameraDevice {
      texture_id: next_texture_id(),
      path,
      device,
      size: Size::new(format.width, format.height),
      fourcc: format.fourcc,
      zoom,
      torch: if has_flash {
        TorchState::Off
      } else {
        TorchState::Unavailable
      },
      released: Arc::new(AtomicBool::new(false)),
    })
  }
}

pub struct V4lCameraDevice {
  texture_id: i64,
  path: PathBuf,
  device: v4l::Device,
  size: Size,
  fourcc: FourCC,
  zoom: Option<(i64, i64)>,
  torch: TorchState,
  released: Arc<AtomicBool>,
}

impl V4lCameraDevice {
  fn apply_zoom(&mut self, scale: f64) -> Result<f64, CameraError> {
    let (min, max) = self
      .zoom
      .ok_or_else(|| CameraError::Unsupported("缩放".to_string()))?;
    if !(MIN_ZOOM_SCALE..=MAX_ZOOM_SCALE).contains(&scale) {
      return Err(CameraError::ZoomOutOfRange {
        requested: scale,
        min: MIN_ZOOM_SCALE,
        max: MAX_ZOOM_SCALE,
      });
    }

    let ratio = (scale - MIN_ZOOM_SCALE) / (MAX_ZOOM_SCALE - MIN_ZOOM_SCALE);
    let value = min + ((max - min) as f64 * ratio).round() as i64;
    self
      .device
      .set_control(Control {
        id: V4L2_CID_ZOOM_ABSOLUTE,
        value: Value::Integer(value),
      })
      .map_err(device_error)?;
    debug!("V4L 缩放 {} -> 控制值 {}", scale, value);
    Ok(scale)
  }
}

impl CameraDevice for V4lCameraDevice {
  type Frames = V4lFrames;

  fn texture_id(&self) -> i64 {
    self.texture_id
  }

  fn size(&self) -> Size {
    self.size
  }

  fn torch_state(&self) -> TorchState {
    self.torch
  }

  fn set_torch(&mut self, on: bool) -> Result<TorchState, CameraError> {
    if self.torch == TorchState::Unavailable {
      return Err(CameraError::Unsupported("闪光灯".to_string()));
    }
    let mode = if on {
      V4L2_FLASH_LED_MODE_TORCH
    } else {
      V4L2_FLASH_LED_MODE_NONE
    };
    self
      .device
      .set_control(Control {
        id: V4L2_CID_FLASH_LED_MODE,
        value: Value::Integer(mode),
      })
      .map_err(device_error)?;
    self.torch = if on { TorchState::On } else { TorchState::Off };
    Ok(self.torch)
  }

  fn set_zoom(&mut self, scale: f64) -> Result<f64, CameraError> {
    self.apply_zoom(scale)
  }

  fn reset_zoom(&mut self) -> Result<f64, CameraError> {
    self.apply_zoom(MIN_ZOOM_SCALE)
  }

  fn frames(&mut self) -> Result<Self::Frames, CameraError> {
    let device = v4l::Device::with_path(&self.path).map_err(device_error)?;
    Ok(V4lFrames {
      device,
      size: self.size,
      fourcc: self.fourcc,
      released: self.released.clone(),
    })
  }

  fn release(&mut self) -> Result<(), CameraError> {
    self.released.store(true, Ordering::Release);
    if self.torch == TorchState::On {
      self.set_torch(false)?;
    }
    Ok(())
  }
}

/// V4L 帧流
///
/// 每次取帧时建立一次内存映射流，流对象不跨线程移动。
pub struct V4lFrames {
  device: v4l::Device,
  size: Size,
  fourcc: FourCC,
  released: Arc<AtomicBool>,
}

impl V4lFrames {
  fn capture(&mut self) -> Result<RgbImage, CameraError> {
    let mut stream =
      Stream::with_buffers(&self.device, Type::VideoCapture, STREAM_BUFFERS).map_err(device_error)?;
    let (buf, _meta) = stream.next().map_err(device_error)?;
    convert_to_rgb(buf, self.size, self.fourcc)
  }
}

impl Iterator for V4lFrames {
  type Item = Result<RgbImage, CameraError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.released.load(Ordering::Acquire) {
      return None;
    }
    Some(self.capture())
  }
}

fn convert_to_rgb(data: &[u8], size: Size, fourcc: FourCC) -> Result<RgbImage, CameraError> {
  let (width, height) = (size.width as usize, size.height as usize);
  match &fourcc.repr {
    b"RGB3" => {
      let expected = width * height * 3;
      if data.len() < expected {
        return Err(CameraError::Device(format!(
          "缓冲区大小不匹配: 期望 {} 字节, 实际 {} 字节",
          expected,
          data.len()
        )));
      }
      RgbImage::from_raw(size.width, size.height, data[..expected].to_vec())
        .ok_or_else(|| CameraError::Device("无法构造 RGB 图像".to_string()))
    }
    b"MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8()),
    b"YUYV" => yuyv_to_rgb(data, size),
    other => Err(CameraError::Unsupported(format!(
      "像素格式 {}",
      String::from_utf8_lossy(other)
    ))),
  }
}

fn yuyv_to_rgb(data: &[u8], size: Size) -> Result<RgbImage, CameraError> {
  let pixels = size.width as usize * size.height as usize;
  if data.len() < pixels * 2 {
    return Err(CameraError::Device(format!(
      "缓冲区大小不匹配: 期望 {} 字节, 实际 {} 字节",
      pixels * 2,
      data.len()
    )));
  }

  let mut rgb = Vec::with_capacity(pixels * 3);
  for chunk in data[..pixels * 2].chunks_exact(4) {
    let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32, chunk[2] as f32, chunk[3] as f32);
    for y in [y0, y1] {
      let c = y - 16.0;
      let d = u - 128.0;
      let e = v - 128.0;
      rgb.push((1.164 * c + 1.596 * e).clamp(0.0, 255.0) as u8);
      rgb.push((1.164 * c - 0.392 * d - 0.813 * e).clamp(0.0, 255.0) as u8);
      rgb.push((1.164 * c + 2.017 * d).clamp(0.0, 255.0) as u8);
    }
  }

  RgbImage::from_raw(size.width, size.height, rgb)
    .ok_or_else(|| CameraError::Device("无法构造 RGB 图像".to_string()))
}
