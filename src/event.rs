// 该文件是 Saoma （扫码） 项目的一部分。
// src/event.rs - 事件定义与投递
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
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
  },
  time::Duration,
};

use serde::{Serialize, Serializer, ser::SerializeMap};
use tracing::debug;

use crate::{barcode::Barcode, camera::TorchState, error::ScannerError, frame::FrameImage};

/// 一帧的识别结果
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeEvent {
  pub barcodes: Vec<Barcode>,
  pub image: FrameImage,
}

/// 推送给调用方的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ScannerEvent {
  Barcode(BarcodeEvent),
  TorchState(TorchState),
  ZoomScaleState(f64),
  Error(ScannerError),
}

impl ScannerEvent {
  pub fn name(&self) -> &'static str {
    match self {
      ScannerEvent::Barcode(_) => "barcode",
      ScannerEvent::TorchState(_) => "torchState",
      ScannerEvent::ZoomScaleState(_) => "zoomScaleState",
      ScannerEvent::Error(_) => "error",
    }
  }
}

impl Serialize for ScannerEvent {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(None)?;
    map.serialize_entry("name", self.name())?;
    match self {
      ScannerEvent::Barcode(event) => {
        map.serialize_entry("data", &event.barcodes)?;
        map.serialize_entry("image", &event.image)?;
      }
      ScannerEvent::TorchState(state) => map.serialize_entry("data", &state.code())?,
      ScannerEvent::ZoomScaleState(scale) => map.serialize_entry("data", scale)?,
      ScannerEvent::Error(error) => {
        map.serialize_entry("code", error.code())?;
        map.serialize_entry("message", &error.to_string())?;
      }
    }
    map.end()
  }
}

/// 事件发送端，所有事件都经由同一个通道投递，调用方看到的是有序的事件流
#[derive(Debug, Clone)]
pub struct EventSink {
  tx: Sender<ScannerEvent>,
}

impl EventSink {
  pub fn emit(&self, event: ScannerEvent) {
    if self.tx.send(event).is_err() {
      debug!("事件接收端已关闭，丢弃事件");
    }
  }

  /// 绑定到某个会话的发送端，会话失效后不再发出任何事件
  pub fn for_session(&self, active: Arc<AtomicBool>) -> SessionSink {
    SessionSink {
      sink: self.clone(),
      active,
    }
  }
}

#[derive(Debug, Clone)]
pub struct SessionSink {
  sink: EventSink,
  active: Arc<AtomicBool>,
}

impl SessionSink {
  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::Acquire)
  }

  pub fn emit(&self, event: ScannerEvent) {
    if self.is_active() {
      self.sink.emit(event);
    } else {
      debug!("会话已结束，丢弃事件: {}", event.name());
    }
  }
}

/// 事件接收端
#[derive(Debug)]
pub struct EventStream {
  rx: Receiver<ScannerEvent>,
}

impl EventStream {
  pub fn recv_timeout(&self, timeout: Duration) -> Option<ScannerEvent> {
    match self.rx.recv_timeout(timeout) {
      Ok(event) => Some(event),
      Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
    }
  }

  pub fn try_recv(&self) -> Option<ScannerEvent> {
    self.rx.try_recv().ok()
  }
}

impl Iterator for EventStream {
  type Item = ScannerEvent;

  fn next(&mut self) -> Option<Self::Item> {
    self.rx.recv().ok()
  }
}

pub fn channel() -> (EventSink, EventStream) {
  let (tx, rx) = mpsc::channel();
  (EventSink { tx }, EventStream { rx })
}
