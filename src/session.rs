// 该文件是 Saoma （扫码） 项目的一部分。
// src/session.rs - 摄像头会话状态机
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
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError},
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
  assembler::DetectionAssembler,
  barcode::FormatFilter,
  camera::{
    CameraDevice, CameraError, CameraFacing, CameraProvider, CaptureConfig, PermissionState,
    TorchState,
  },
  detector::{DetectOptions, DetectionSpeed, Detector},
  error::ScannerError,
  event::{self, EventSink, EventStream, ScannerEvent, SessionSink},
  frame::Frame,
  geometry::{ScanWindow, SharedScanWindow, Size},
  options::ScannerOptions,
};

/// 启动会话时的参数
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
  pub facing: CameraFacing,
  pub torch: bool,
  pub formats: FormatFilter,
  pub return_image: bool,
  pub speed: DetectionSpeed,
  /// `None` 表示不限制
  pub timeout: Option<Duration>,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      facing: CameraFacing::Back,
      torch: false,
      formats: FormatFilter::all(),
      return_image: false,
      speed: DetectionSpeed::default(),
      timeout: None,
    }
  }
}

impl SessionConfig {
  pub fn with_facing(mut self, facing: CameraFacing) -> Self {
    self.facing = facing;
    self
  }

  pub fn with_torch(mut self, torch: bool) -> Self {
    self.torch = torch;
    self
  }

  pub fn with_formats(mut self, formats: FormatFilter) -> Self {
    self.formats = formats;
    self
  }

  pub fn with_return_image(mut self, return_image: bool) -> Self {
    self.return_image = return_image;
    self
  }

  pub fn with_speed(mut self, speed: DetectionSpeed) -> Self {
    self.speed = speed;
    self
  }

  /// 0 表示不限制
  pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
    self
  }

  pub fn capture_config(&self) -> CaptureConfig {
    CaptureConfig {
      facing: self.facing,
      torch: self.torch,
      timeout: self.timeout,
    }
  }
}

/// 启动成功后返回给调用方的会话信息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
  pub texture_id: i64,
  pub size: Size,
  pub current_torch_state: TorchState,
}

/// 对外可见的会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Stopped,
  Starting,
  Running,
  Stopping,
}

struct RunningSession<Dev> {
  device: Dev,
  handle: SessionHandle,
  active: Arc<AtomicBool>,
  done: Receiver<()>,
  worker: Option<JoinHandle<()>>,
}

enum Slot<Dev> {
  Stopped,
  /// 带有启动批次号，停止后旧批次的启动结果会被丢弃
  Starting(u64),
  Running(RunningSession<Dev>),
  Stopping,
}

impl<Dev> Slot<Dev> {
  fn state(&self) -> SessionState {
    match self {
      Slot::Stopped => SessionState::Stopped,
      Slot::Starting(_) => SessionState::Starting,
      Slot::Running(_) => SessionState::Running,
      Slot::Stopping => SessionState::Stopping,
    }
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn start_error(e: CameraError) -> ScannerError {
  match e {
    CameraError::NoDevice(_) => ScannerError::NoCamera,
    CameraError::Other(detail) => ScannerError::Generic(detail),
    other => ScannerError::CameraError(other.to_string()),
  }
}

fn zoom_error(e: CameraError) -> ScannerError {
  match e {
    CameraError::Other(detail) => ScannerError::Generic(detail),
    other => ScannerError::ZoomError(other.to_string()),
  }
}

fn release_quietly<Dev: CameraDevice>(device: &mut Dev) {
  if let Err(e) = device.release() {
    warn!("释放摄像头失败: {}", e);
  }
}

/// 采集线程：取帧、识别、组装、发出事件
struct CaptureWorker<F, D: Detector> {
  frames: F,
  detector: Arc<D>,
  assembler: DetectionAssembler,
  options: DetectOptions,
  sink: SessionSink,
}

impl<F, D> CaptureWorker<F, D>
where
  F: Iterator<Item = Result<image::RgbImage, CameraError>>,
  D: Detector,
{
  fn run(self) {
    let CaptureWorker {
      frames,
      detector,
      mut assembler,
      options,
      sink,
    } = self;

    info!("采集线程启动");
    for (index, captured) in frames.enumerate() {
      if !sink.is_active() {
        break;
      }

      let image = match captured {
        Ok(image) => image,
        Err(e) => {
          error!("采集失败: {}", e);
          sink.emit(ScannerEvent::Error(ScannerError::CameraError(e.to_string())));
          break;
        }
      };

      let frame = Frame::new(image, index as u64);
      let detected = detector.detect(frame.image(), &options);
      if let Some(event) = assembler.assemble(&frame, detected) {
        sink.emit(event);
      }
    }
    info!("采集线程退出");
  }
}

/// 摄像头会话控制器
///
/// 同一时刻最多只有一个会话。所有方法都可以从任意线程调用，
/// 事件统一经由 [`SessionController::new`] 返回的 [`EventStream`] 送出。
pub struct SessionController<P: CameraProvider, D: Detector> {
  provider: Mutex<P>,
  detector: Arc<D>,
  slot: Mutex<Slot<P::Device>>,
  generation: AtomicU64,
  scan_window: SharedScanWindow,
  sink: EventSink,
  options: ScannerOptions,
}

impl<P: CameraProvider, D: Detector> SessionController<P, D> {
  pub fn new(provider: P, detector: Arc<D>, options: ScannerOptions) -> (Self, EventStream) {
    let (sink, stream) = event::channel();
    let controller = Self {
      provider: Mutex::new(provider),
      detector,
      slot: Mutex::new(Slot::Stopped),
      generation: AtomicU64::new(0),
      scan_window: SharedScanWindow::new(options.scan_window),
      sink,
      options,
    };
    (controller, stream)
  }

  pub fn state(&self) -> SessionState {
    lock(&self.slot).state()
  }

  /// 运行中会话的信息
  pub fn handle(&self) -> Option<SessionHandle> {
    match &*lock(&self.slot) {
      Slot::Running(session) => Some(session.handle.clone()),
      _ => None,
    }
  }

  pub fn permission_state(&self) -> PermissionState {
    lock(&self.provider).permission_state()
  }

  pub fn request_permission(&self) -> bool {
    lock(&self.provider).request_permission()
  }

  pub fn start(&self, config: SessionConfig) -> Result<SessionHandle, ScannerError> {
    let generation = {
      let mut slot = lock(&self.slot);
      if !matches!(*slot, Slot::Stopped) {
        warn!("会话已在 {:?} 状态，拒绝重复启动", slot.state());
        return Err(ScannerError::AlreadyStarted);
      }
      let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
      *slot = Slot::Starting(generation);
      generation
    };

    info!("启动会话 #{}: {:?}", generation, config);
    let launched = self.launch(&config);

    let mut slot = lock(&self.slot);
    let current = matches!(*slot, Slot::Starting(g) if g == generation);
    match launched {
      Ok(session) if current => {
        let handle = session.handle.clone();
        *slot = Slot::Running(session);
        info!(
          "会话 #{} 已启动: 纹理 {}, 尺寸 {}x{}",
          generation, handle.texture_id, handle.size.width, handle.size.height
        );
        Ok(handle)
      }
      Ok(session) => {
        drop(slot);
        warn!("会话 #{} 在启动过程中被停止", generation);
        self.shutdown(session);
        Err(ScannerError::generic("启动过程中会话被停止"))
      }
      Err(e) => {
        if current {
          *slot = Slot::Stopped;
        }
        error!("会话 #{} 启动失败: {}", generation, e);
        Err(e)
      }
    }
  }

  fn launch(&self, config: &SessionConfig) -> Result<RunningSession<P::Device>, ScannerError> {
    let mut device = lock(&self.provider)
      .open(&config.capture_config())
      .map_err(start_error)?;

    if config.torch {
      if let Err(e) = device.set_torch(true) {
        warn!("打开闪光灯失败: {}", e);
      }
    }

    let frames = match device.frames() {
      Ok(frames) => frames,
      Err(e) => {
        release_quietly(&mut device);
        return Err(start_error(e));
      }
    };

    let handle = SessionHandle {
      texture_id: device.texture_id(),
      size: device.size(),
      current_torch_state: device.torch_state(),
    };

    let active = Arc::new(AtomicBool::new(true));
    let worker = CaptureWorker {
      frames,
      detector: self.detector.clone(),
      assembler: DetectionAssembler::new(self.scan_window.clone(), config.return_image)
        .with_speed(config.speed)
        .with_jpeg_quality(self.options.jpeg_quality),
      options: DetectOptions {
        formats: config.formats.clone(),
        facing: config.facing,
      },
      sink: self.sink.for_session(active.clone()),
    };

    let (done_tx, done) = mpsc::channel();
    let spawned = thread::Builder::new()
      .name(format!("saoma-capture-{}", handle.texture_id))
      .spawn(move || {
        worker.run();
        let _ = done_tx.send(());
      });
    let worker = match spawned {
      Ok(worker) => worker,
      Err(e) => {
        active.store(false, Ordering::Release);
        release_quietly(&mut device);
        return Err(ScannerError::generic(e));
      }
    };

    Ok(RunningSession {
      device,
      handle,
      active,
      done,
      worker: Some(worker),
    })
  }

  /// 停止会话，总是成功
  pub fn stop(&self) {
    let session = {
      let mut slot = lock(&self.slot);
      match std::mem::replace(&mut *slot, Slot::Stopped) {
        Slot::Running(session) => {
          *slot = Slot::Stopping;
          session
        }
        Slot::Starting(generation) => {
          info!("取消正在启动的会话 #{}", generation);
          return;
        }
        Slot::Stopping => {
          *slot = Slot::Stopping;
          debug!("会话正在停止");
          return;
        }
        Slot::Stopped => {
          debug!("会话未运行，无需停止");
          return;
        }
      }
    };

    self.shutdown(session);
    *lock(&self.slot) = Slot::Stopped;
    info!("会话已停止");
  }

  fn shutdown(&self, mut session: RunningSession<P::Device>) {
    session.active.store(false, Ordering::Release);
    release_quietly(&mut session.device);

    match session.done.recv_timeout(self.options.stop_timeout) {
      Ok(()) | Err(RecvTimeoutError::Disconnected) => {
        if let Some(worker) = session.worker.take() {
          if worker.join().is_err() {
            warn!("采集线程异常退出");
          }
        }
      }
      Err(RecvTimeoutError::Timeout) => {
        warn!(
          "采集线程未在 {:?} 内退出，不再等待",
          self.options.stop_timeout
        );
      }
    }
  }

  /// 切换闪光灯；会话未运行或切换失败时不发出事件
  pub fn toggle_torch(&self) {
    let mut slot = lock(&self.slot);
    let Slot::Running(session) = &mut *slot else {
      debug!("会话未运行，忽略闪光灯切换");
      return;
    };

    let on = !session.device.torch_state().is_on();
    match session.device.set_torch(on) {
      Ok(state) => {
        session.handle.current_torch_state = state;
        self.sink.emit(ScannerEvent::TorchState(state));
      }
      Err(e) => warn!("切换闪光灯失败: {}", e),
    }
  }

  pub fn set_scale(&self, scale: f64) -> Result<(), ScannerError> {
    if !scale.is_finite() {
      return Err(ScannerError::InvalidZoomScale(scale.to_string()));
    }
    self.zoom(|device| device.set_zoom(scale))
  }

  pub fn reset_scale(&self) -> Result<(), ScannerError> {
    self.zoom(|device| device.reset_zoom())
  }

  fn zoom(
    &self,
    apply: impl FnOnce(&mut P::Device) -> Result<f64, CameraError>,
  ) -> Result<(), ScannerError> {
    let mut slot = lock(&self.slot);
    let Slot::Running(session) = &mut *slot else {
      return Err(ScannerError::ZoomWhenStopped);
    };

    let applied = apply(&mut session.device).map_err(zoom_error)?;
    debug!("缩放比例: {}", applied);
    self.sink.emit(ScannerEvent::ZoomScaleState(applied));
    Ok(())
  }

  /// 设置扫描窗口，`None` 表示不限制；从下一帧开始生效
  pub fn update_scan_window(&self, window: Option<ScanWindow>) {
    debug!("扫描窗口: {:?}", window);
    self.scan_window.set(window);
  }

  pub fn scan_window(&self) -> Option<ScanWindow> {
    self.scan_window.get()
  }
}

impl<P: CameraProvider, D: Detector> Drop for SessionController<P, D> {
  fn drop(&mut self) {
    self.stop();
  }
}
