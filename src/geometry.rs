// 该文件是 Saoma （扫码） 项目的一部分。
// src/geometry.rs - 扫描窗口几何过滤
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

//! # 扫描窗口几何过滤
//!
//! 扫描窗口是一个归一化的矩形 `[min_x, min_y, max_x, max_y]`，每个分量都相对于帧的
//! 宽和高。过滤时先把窗口按帧尺寸换算到像素坐标，再判断条码的包围盒是否被窗口
//! 完全包含（边界相等视为包含，部分相交视为不包含）。
//!
//! 窗口本身不做合法性校验：换算后宽或高不为正的窗口不包含任何条码。

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::barcode::Barcode;

/// 像素坐标中的一个点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

impl Point {
  pub fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }
}

/// 帧的像素尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
  pub width: u32,
  pub height: u32,
}

impl Size {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }
}

/// 轴对齐矩形，`(x, y)` 为左上角
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
}

impl Rect {
  pub fn max_x(&self) -> f64 {
    self.x + self.width
  }

  pub fn max_y(&self) -> f64 {
    self.y + self.height
  }

  /// 宽或高不为正（或为 NaN）的矩形
  pub fn is_degenerate(&self) -> bool {
    !(self.width > 0.0 && self.height > 0.0)
  }

  /// `other` 是否完全落在 `self` 之内
  pub fn contains(&self, other: &Rect) -> bool {
    if self.is_degenerate() || !(other.width >= 0.0 && other.height >= 0.0) {
      return false;
    }

    other.x >= self.x
      && other.y >= self.y
      && other.max_x() <= self.max_x()
      && other.max_y() <= self.max_y()
  }
}

/// 归一化扫描窗口
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanWindow {
  pub min_x: f64,
  pub min_y: f64,
  pub max_x: f64,
  pub max_y: f64,
}

impl ScanWindow {
  pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
    Self {
      min_x,
      min_y,
      max_x,
      max_y,
    }
  }

  /// 按帧尺寸换算到像素坐标
  pub fn scaled(&self, size: Size) -> Rect {
    let (w, h) = (size.width as f64, size.height as f64);
    let x = self.min_x * w;
    let y = self.min_y * h;

    Rect {
      x,
      y,
      width: self.max_x * w - x,
      height: self.max_y * h - y,
    }
  }
}

impl From<[f64; 4]> for ScanWindow {
  fn from(rect: [f64; 4]) -> Self {
    Self::new(rect[0], rect[1], rect[2], rect[3])
  }
}

impl TryFrom<&[f64]> for ScanWindow {
  type Error = usize;

  fn try_from(rect: &[f64]) -> Result<Self, Self::Error> {
    let rect: [f64; 4] = rect.try_into().map_err(|_| rect.len())?;
    Ok(Self::from(rect))
  }
}

/// 条码角点构成的包围盒
///
/// 依赖角点顺序：0 号点为最小 x/y，2 号点给出最大 x，3 号点给出最大 y。
pub fn bounding_box(barcode: &Barcode) -> Rect {
  let corners = barcode.corners();
  let x = corners[0].x;
  let y = corners[0].y;

  Rect {
    x,
    y,
    width: corners[2].x - x,
    height: corners[3].y - y,
  }
}

/// 判断条码是否落在扫描窗口内，窗口缺省时总是通过
pub fn is_in_window(barcode: &Barcode, frame_size: Size, window: Option<&ScanWindow>) -> bool {
  match window {
    None => true,
    Some(window) => window.scaled(frame_size).contains(&bounding_box(barcode)),
  }
}

/// 控制线程写、采集线程读的扫描窗口
///
/// 读取时整体复制窗口，读者只会看到旧值或新值。
#[derive(Debug, Clone, Default)]
pub struct SharedScanWindow {
  inner: Arc<RwLock<Option<ScanWindow>>>,
}

impl SharedScanWindow {
  pub fn new(window: Option<ScanWindow>) -> Self {
    Self {
      inner: Arc::new(RwLock::new(window)),
    }
  }

  pub fn get(&self) -> Option<ScanWindow> {
    *self.inner.read().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn set(&self, window: Option<ScanWindow>) {
    *self.inner.write().unwrap_or_else(PoisonError::into_inner) = window;
  }
}
