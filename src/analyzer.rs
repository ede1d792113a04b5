// 该文件是 Saoma （扫码） 项目的一部分。
// src/analyzer.rs - 单张图片识别
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

use std::{path::Path, sync::Arc};

use image::ImageReader;
use serde::{Serialize, Serializer, ser::SerializeMap};
use tracing::{debug, info, warn};

use crate::{
  barcode::{Barcode, FormatFilter},
  camera::CameraFacing,
  detector::{DetectOptions, Detector},
  error::ScannerError,
};

/// 单张图片的识别结果，序列化为 `{"name": "barcode", "data": [...]}`
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeResult {
  pub barcodes: Vec<Barcode>,
}

impl Serialize for AnalyzeResult {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(2))?;
    map.serialize_entry("name", "barcode")?;
    map.serialize_entry("data", &self.barcodes)?;
    map.end()
  }
}

/// 对图片文件做一次性识别，与摄像头会话互不影响
pub struct ImageAnalyzer<D: Detector> {
  detector: Arc<D>,
}

impl<D: Detector> Clone for ImageAnalyzer<D> {
  fn clone(&self) -> Self {
    Self {
      detector: self.detector.clone(),
    }
  }
}

impl<D: Detector> ImageAnalyzer<D> {
  pub fn new(detector: Arc<D>) -> Self {
    Self { detector }
  }

  /// 图片无法读取或没有识别到条码时返回 `Ok(None)`
  pub fn analyze(
    &self,
    path: impl AsRef<Path>,
    formats: &FormatFilter,
  ) -> Result<Option<AnalyzeResult>, ScannerError> {
    let path = path.as_ref();
    let image = match ImageReader::open(path).and_then(|reader| reader.with_guessed_format()) {
      Ok(reader) => match reader.decode() {
        Ok(image) => image.to_rgb8(),
        Err(e) => {
          warn!("无法解码图片 {}: {}", path.display(), e);
          return Ok(None);
        }
      },
      Err(e) => {
        warn!("无法打开图片 {}: {}", path.display(), e);
        return Ok(None);
      }
    };

    // 静态图片按后置摄像头处理，不做扫描窗口过滤
    let options = DetectOptions {
      formats: formats.clone(),
      facing: CameraFacing::Back,
    };
    let barcodes = self
      .detector
      .detect(&image, &options)
      .map_err(|e| ScannerError::BarcodeError(e.to_string()))?;

    if barcodes.is_empty() {
      debug!("图片 {} 中没有条码", path.display());
      return Ok(None);
    }

    info!("图片 {} 中识别到 {} 个条码", path.display(), barcodes.len());
    Ok(Some(AnalyzeResult { barcodes }))
  }
}
