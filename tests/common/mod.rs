// 该文件是 Saoma （扫码） 项目的一部分。
// tests/common/mod.rs - 测试用摄像头与检测器
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

#![allow(dead_code)]

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc::{self, Receiver, Sender},
  },
  thread,
  time::{Duration, Instant},
};

use image::RgbImage;
use saoma::{
  EventStream, ScannerEvent,
  barcode::{Barcode, BarcodeFormat},
  camera::{
    CameraDevice, CameraError, CameraFacing, CameraProvider, CaptureConfig, PermissionState,
    TorchState,
  },
  detector::{DetectOptions, Detector},
  geometry::{Point, Size},
};

pub const FRAME_SIZE: u32 = 100;
pub const WAIT: Duration = Duration::from_secs(3);

/// 观察摄像头行为的计数器
#[derive(Debug, Default)]
pub struct CameraCounters {
  pub opened: AtomicUsize,
  pub released: AtomicUsize,
  pub last_config: Mutex<Option<CaptureConfig>>,
}

#[derive(Debug, Clone)]
pub struct ScriptedCamera {
  pub facings: Vec<CameraFacing>,
  pub has_torch: bool,
  pub fail_release: bool,
  /// 输出指定帧数后返回采集错误
  pub fail_after: Option<usize>,
  pub max_zoom: f64,
  /// 帧流在第一帧前永久阻塞
  pub wedged: bool,
  /// 设置后 `open` 会等待放行
  pub gate: Option<OpenGate>,
  pub counters: Arc<CameraCounters>,
}

/// 控制 `open` 何时返回
#[derive(Debug, Clone)]
pub struct OpenGate {
  entered: Sender<()>,
  release: Arc<Mutex<Receiver<()>>>,
}

/// 测试线程持有的一端
pub struct GateHandle {
  entered: Receiver<()>,
  release: Sender<()>,
}

impl GateHandle {
  /// 等待 `open` 开始阻塞
  pub fn wait_entered(&self) {
    self.entered.recv_timeout(WAIT).unwrap();
  }

  pub fn open(&self) {
    self.release.send(()).unwrap();
  }
}

pub fn open_gate() -> (OpenGate, GateHandle) {
  let (entered_tx, entered_rx) = mpsc::channel();
  let (release_tx, release_rx) = mpsc::channel();
  (
    OpenGate {
      entered: entered_tx,
      release: Arc::new(Mutex::new(release_rx)),
    },
    GateHandle {
      entered: entered_rx,
      release: release_tx,
    },
  )
}

impl Default for ScriptedCamera {
  fn default() -> Self {
    Self {
      facings: vec![CameraFacing::Back],
      has_torch: true,
      fail_release: false,
      fail_after: None,
      max_zoom: 4.0,
      wedged: false,
      gate: None,
      counters: Arc::default(),
    }
  }
}

impl CameraProvider for ScriptedCamera {
  type Device = ScriptedDevice;

  fn permission_state(&self) -> PermissionState {
    PermissionState::Authorized
  }

  fn request_permission(&mut self) -> bool {
    true
  }

  fn open(&mut self, config: &CaptureConfig) -> Result<Self::Device, CameraError> {
    if !self.facings.contains(&config.facing) {
      return Err(CameraError::NoDevice(config.facing));
    }
    if let Some(gate) = &self.gate {
      gate.entered.send(()).unwrap();
      gate.release.lock().unwrap().recv().unwrap();
    }
    self.counters.opened.fetch_add(1, Ordering::SeqCst);
    *self.counters.last_config.lock().unwrap() = Some(config.clone());
    Ok(ScriptedDevice {
      camera: self.clone(),
      torch: if self.has_torch {
        TorchState::Off
      } else {
        TorchState::Unavailable
      },
      released: Arc::new(AtomicBool::new(false)),
    })
  }
}

pub struct ScriptedDevice {
  camera: ScriptedCamera,
  torch: TorchState,
  released: Arc<AtomicBool>,
}

impl CameraDevice for ScriptedDevice {
  type Frames = ScriptedFrames;

  fn texture_id(&self) -> i64 {
    42
  }

  fn size(&self) -> Size {
    Size::new(FRAME_SIZE, FRAME_SIZE)
  }

  fn torch_state(&self) -> TorchState {
    self.torch
  }

  fn set_torch(&mut self, on: bool) -> Result<TorchState, CameraError> {
    if !self.camera.has_torch {
      return Err(CameraError::Unsupported("torch".into()));
    }
    self.torch = if on { TorchState::On } else { TorchState::Off };
    Ok(self.torch)
  }

  fn set_zoom(&mut self, scale: f64) -> Result<f64, CameraError> {
    if scale < 1.0 || scale > self.camera.max_zoom {
      return Err(CameraError::ZoomOutOfRange {
        requested: scale,
        min: 1.0,
        max: self.camera.max_zoom,
      });
    }
    Ok(scale)
  }

  fn reset_zoom(&mut self) -> Result<f64, CameraError> {
    Ok(1.0)
  }

  fn frames(&mut self) -> Result<Self::Frames, CameraError> {
    Ok(ScriptedFrames {
      released: self.released.clone(),
      wedged: self.camera.wedged,
      fail_after: self.camera.fail_after,
      produced: 0,
    })
  }

  fn release(&mut self) -> Result<(), CameraError> {
    self.released.store(true, Ordering::SeqCst);
    self.camera.counters.released.fetch_add(1, Ordering::SeqCst);
    if self.camera.fail_release {
      return Err(CameraError::Device("release failed".into()));
    }
    Ok(())
  }
}

pub struct ScriptedFrames {
  released: Arc<AtomicBool>,
  wedged: bool,
  fail_after: Option<usize>,
  produced: usize,
}

impl Iterator for ScriptedFrames {
  type Item = Result<RgbImage, CameraError>;

  fn next(&mut self) -> Option<Self::Item> {
    while self.wedged {
      thread::park();
    }
    if self.released.load(Ordering::SeqCst) {
      return None;
    }
    if self.produced > 0 {
      thread::sleep(Duration::from_millis(5));
    }
    if self.fail_after == Some(self.produced) {
      self.produced += 1;
      return Some(Err(CameraError::Device("stream broken".into())));
    }
    self.produced += 1;
    Some(Ok(RgbImage::new(FRAME_SIZE, FRAME_SIZE)))
  }
}

/// 每帧返回预设结果的检测器
#[derive(Debug, Default)]
pub struct ScriptedDetector {
  barcodes: Mutex<Vec<Barcode>>,
  failure: Mutex<Option<String>>,
}

impl ScriptedDetector {
  pub fn returning(barcodes: Vec<Barcode>) -> Self {
    Self {
      barcodes: Mutex::new(barcodes),
      failure: Mutex::new(None),
    }
  }

  pub fn failing(message: &str) -> Self {
    Self {
      barcodes: Mutex::new(Vec::new()),
      failure: Mutex::new(Some(message.to_string())),
    }
  }
}

impl Detector for ScriptedDetector {
  type Error = std::io::Error;

  fn detect(&self, _: &RgbImage, _: &DetectOptions) -> Result<Vec<Barcode>, Self::Error> {
    if let Some(message) = self.failure.lock().unwrap().clone() {
      return Err(std::io::Error::other(message));
    }
    Ok(self.barcodes.lock().unwrap().clone())
  }
}

pub fn square(value: &str, min: f64, max: f64) -> Barcode {
  Barcode::new(
    BarcodeFormat::QrCode,
    value,
    [
      Point::new(min, min),
      Point::new(max, min),
      Point::new(max, max),
      Point::new(min, max),
    ],
  )
}

/// 等待第一个满足条件的事件，跳过其他事件
pub fn wait_for(
  events: &EventStream,
  mut accept: impl FnMut(&ScannerEvent) -> bool,
) -> Option<ScannerEvent> {
  let deadline = Instant::now() + WAIT;
  while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
    match events.recv_timeout(remaining) {
      Some(event) if accept(&event) => return Some(event),
      Some(_) => continue,
      None => return None,
    }
  }
  None
}

/// 取出当前已排队的全部事件
pub fn drain(events: &EventStream) -> Vec<ScannerEvent> {
  let mut drained = Vec::new();
  while let Some(event) = events.try_recv() {
    drained.push(event);
  }
  drained
}
