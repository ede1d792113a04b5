// 该文件是 Saoma （扫码） 项目的一部分。
// src/barcode.rs - 条码检测结果定义
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

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::geometry::Point;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarcodeConstructError {
  #[error("条码角点数量错误: 期望 4 个, 实际 {0} 个")]
  InvalidCorners(usize),
}

/// 条码格式，取值与调用方约定的整数编码一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarcodeFormat {
  Unknown,
  All,
  Code128,
  Code39,
  Code93,
  Codabar,
  DataMatrix,
  Ean13,
  Ean8,
  Itf,
  QrCode,
  UpcA,
  UpcE,
  Pdf417,
  Aztec,
}

impl BarcodeFormat {
  pub fn code(self) -> i32 {
    match self {
      BarcodeFormat::Unknown => -1,
      BarcodeFormat::All => 0,
      BarcodeFormat::Code128 => 1,
      BarcodeFormat::Code39 => 2,
      BarcodeFormat::Code93 => 4,
      BarcodeFormat::Codabar => 8,
      BarcodeFormat::DataMatrix => 16,
      BarcodeFormat::Ean13 => 32,
      BarcodeFormat::Ean8 => 64,
      BarcodeFormat::Itf => 128,
      BarcodeFormat::QrCode => 256,
      BarcodeFormat::UpcA => 512,
      BarcodeFormat::UpcE => 1024,
      BarcodeFormat::Pdf417 => 2048,
      BarcodeFormat::Aztec => 4096,
    }
  }

  pub fn from_code(code: i64) -> Option<Self> {
    let format = match code {
      -1 => BarcodeFormat::Unknown,
      0 => BarcodeFormat::All,
      1 => BarcodeFormat::Code128,
      2 => BarcodeFormat::Code39,
      4 => BarcodeFormat::Code93,
      8 => BarcodeFormat::Codabar,
      16 => BarcodeFormat::DataMatrix,
      32 => BarcodeFormat::Ean13,
      64 => BarcodeFormat::Ean8,
      128 => BarcodeFormat::Itf,
      256 => BarcodeFormat::QrCode,
      512 => BarcodeFormat::UpcA,
      1024 => BarcodeFormat::UpcE,
      2048 => BarcodeFormat::Pdf417,
      4096 => BarcodeFormat::Aztec,
      _ => return None,
    };
    Some(format)
  }
}

impl Serialize for BarcodeFormat {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i32(self.code())
  }
}

/// 请求识别的条码格式，空集合表示全部格式
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatFilter {
  formats: Vec<BarcodeFormat>,
}

impl FormatFilter {
  pub fn all() -> Self {
    Self::default()
  }

  pub fn from_codes(codes: &[i64]) -> Self {
    let mut formats = Vec::with_capacity(codes.len());
    for &code in codes {
      match BarcodeFormat::from_code(code) {
        Some(BarcodeFormat::All) => return Self::all(),
        Some(BarcodeFormat::Unknown) | None => warn!("忽略未知的条码格式编码: {}", code),
        Some(format) => {
          if !formats.contains(&format) {
            formats.push(format);
          }
        }
      }
    }
    Self { formats }
  }

  pub fn is_all(&self) -> bool {
    self.formats.is_empty()
  }

  pub fn accepts(&self, format: BarcodeFormat) -> bool {
    self.is_all() || self.formats.contains(&format)
  }

  pub fn formats(&self) -> &[BarcodeFormat] {
    &self.formats
  }
}

impl FromIterator<BarcodeFormat> for FormatFilter {
  fn from_iter<I: IntoIterator<Item = BarcodeFormat>>(iter: I) -> Self {
    let codes: Vec<i64> = iter.into_iter().map(|f| f.code() as i64).collect();
    Self::from_codes(&codes)
  }
}

/// 条码内容的值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BarcodeType {
  #[default]
  Unknown,
  ContactInfo,
  Email,
  Isbn,
  Phone,
  Product,
  Sms,
  Text,
  Url,
  Wifi,
  Geo,
  CalendarEvent,
  DriverLicense,
}

impl BarcodeType {
  pub fn code(self) -> i32 {
    match self {
      BarcodeType::Unknown => 0,
      BarcodeType::ContactInfo => 1,
      BarcodeType::Email => 2,
      BarcodeType::Isbn => 3,
      BarcodeType::Phone => 4,
      BarcodeType::Product => 5,
      BarcodeType::Sms => 6,
      BarcodeType::Text => 7,
      BarcodeType::Url => 8,
      BarcodeType::Wifi => 9,
      BarcodeType::Geo => 10,
      BarcodeType::CalendarEvent => 11,
      BarcodeType::DriverLicense => 12,
    }
  }

  /// 按内容前缀粗略推断值类型
  pub fn guess(raw_value: &str) -> Self {
    let lower = raw_value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
      BarcodeType::Url
    } else if lower.starts_with("mailto:") {
      BarcodeType::Email
    } else if lower.starts_with("tel:") {
      BarcodeType::Phone
    } else if lower.starts_with("smsto:") || lower.starts_with("sms:") {
      BarcodeType::Sms
    } else if lower.starts_with("wifi:") {
      BarcodeType::Wifi
    } else if lower.starts_with("geo:") {
      BarcodeType::Geo
    } else if lower.starts_with("begin:vcard") || lower.starts_with("mecard:") {
      BarcodeType::ContactInfo
    } else if lower.starts_with("begin:vevent") {
      BarcodeType::CalendarEvent
    } else {
      BarcodeType::Text
    }
  }
}

impl Serialize for BarcodeType {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i32(self.code())
  }
}

/// 一个已识别的条码
///
/// 角点使用帧像素坐标，且必须按固定顺序给出：0 号点为最小 x/y 角，
/// 2 号点的 x 为最大 x，3 号点的 y 为最大 y。扫描窗口过滤依赖这一顺序。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Barcode {
  corners: [Point; 4],
  format: BarcodeFormat,
  raw_bytes: Option<Vec<u8>>,
  raw_value: Option<String>,
  display_value: Option<String>,
  #[serde(rename = "type")]
  value_type: BarcodeType,
  #[serde(flatten)]
  extra: Map<String, Value>,
}

impl Barcode {
  pub fn new(format: BarcodeFormat, raw_value: impl Into<String>, corners: [Point; 4]) -> Self {
    let raw_value = raw_value.into();
    Self {
      corners,
      format,
      raw_bytes: Some(raw_value.clone().into_bytes()),
      value_type: BarcodeType::guess(&raw_value),
      display_value: Some(raw_value.clone()),
      raw_value: Some(raw_value),
      extra: Map::new(),
    }
  }

  /// 从检测器给出的点列表构造，点数不为 4 时报错
  pub fn from_points(
    format: BarcodeFormat,
    raw_value: impl Into<String>,
    points: &[Point],
  ) -> Result<Self, BarcodeConstructError> {
    let corners: [Point; 4] = points
      .try_into()
      .map_err(|_| BarcodeConstructError::InvalidCorners(points.len()))?;
    Ok(Self::new(format, raw_value, corners))
  }

  /// 只有原始字节、没有文本内容的条码
  pub fn from_bytes(format: BarcodeFormat, raw_bytes: Vec<u8>, corners: [Point; 4]) -> Self {
    Self {
      corners,
      format,
      raw_bytes: Some(raw_bytes),
      raw_value: None,
      display_value: None,
      value_type: BarcodeType::Unknown,
      extra: Map::new(),
    }
  }

  pub fn with_display_value(mut self, display_value: impl Into<String>) -> Self {
    self.display_value = Some(display_value.into());
    self
  }

  pub fn with_value_type(mut self, value_type: BarcodeType) -> Self {
    self.value_type = value_type;
    self
  }

  /// 附加类型相关的结构化字段，核心流程不解读这些字段
  pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
    self.extra.insert(key.into(), value);
    self
  }

  pub fn corners(&self) -> &[Point; 4] {
    &self.corners
  }

  pub fn format(&self) -> BarcodeFormat {
    self.format
  }

  pub fn raw_value(&self) -> Option<&str> {
    self.raw_value.as_deref()
  }

  pub fn raw_bytes(&self) -> Option<&[u8]> {
    self.raw_bytes.as_deref()
  }

  pub fn display_value(&self) -> Option<&str> {
    self.display_value.as_deref()
  }

  pub fn value_type(&self) -> BarcodeType {
    self.value_type
  }
}
