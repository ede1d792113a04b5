// 该文件是 Saoma （扫码） 项目的一部分。
// src/handler.rs - 方法调用分发
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

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  analyzer::ImageAnalyzer,
  barcode::FormatFilter,
  camera::{CameraFacing, CameraProvider},
  detector::{DetectionSpeed, Detector},
  error::ScannerError,
  event::EventStream,
  geometry::ScanWindow,
  options::ScannerOptions,
  session::{SessionConfig, SessionController},
};

#[derive(Error, Debug, PartialEq)]
pub enum HandleError {
  #[error("未实现的方法: {0}")]
  NotImplemented(String),
  #[error(transparent)]
  Scanner(#[from] ScannerError),
}

/// 扫码器入口，按方法名分发调用
///
/// 方法与参数均为 JSON，返回值也是 JSON：
///
/// | 方法 | 参数 | 返回 |
/// |------|------|------|
/// | `state` | 无 | 权限状态编码 |
/// | `request` | 无 | 是否获得权限 |
/// | `start` | `{torch, facing, formats, returnImage, speed, timeout}` | 会话信息 |
/// | `stop` | 无 | `null` |
/// | `toggleTorch` | 无 | `null` |
/// | `setScale` | 数值 | `null` |
/// | `resetScale` | 无 | `null` |
/// | `updateScanWindow` | `{rect: [minX, minY, maxX, maxY]}` | `null` |
/// | `analyzeImage` | 路径，或 `{filePath, formats}` | 识别结果或 `null` |
pub struct Scanner<P: CameraProvider, D: Detector> {
  controller: SessionController<P, D>,
  analyzer: ImageAnalyzer<D>,
}

impl<P: CameraProvider, D: Detector> Scanner<P, D> {
  pub fn new(provider: P, detector: D, options: ScannerOptions) -> (Self, EventStream) {
    let detector = Arc::new(detector);
    let analyzer = ImageAnalyzer::new(detector.clone());
    let (controller, events) = SessionController::new(provider, detector, options);
    (
      Self {
        controller,
        analyzer,
      },
      events,
    )
  }

  pub fn controller(&self) -> &SessionController<P, D> {
    &self.controller
  }

  pub fn analyzer(&self) -> &ImageAnalyzer<D> {
    &self.analyzer
  }

  pub fn handle(&self, method: &str, arguments: &Value) -> Result<Value, HandleError> {
    debug!("调用 {}: {}", method, arguments);
    match method {
      "state" => Ok(Value::from(self.controller.permission_state().code())),
      "request" => Ok(Value::from(self.controller.request_permission())),
      "start" => {
        let handle = self.controller.start(session_config(arguments))?;
        to_json(&handle)
      }
      "stop" => {
        self.controller.stop();
        Ok(Value::Null)
      }
      "toggleTorch" => {
        self.controller.toggle_torch();
        Ok(Value::Null)
      }
      "setScale" => {
        let scale = arguments
          .as_f64()
          .ok_or_else(|| ScannerError::InvalidZoomScale(arguments.to_string()))?;
        self.controller.set_scale(scale)?;
        Ok(Value::Null)
      }
      "resetScale" => {
        self.controller.reset_scale()?;
        Ok(Value::Null)
      }
      "updateScanWindow" => {
        self.controller.update_scan_window(scan_window(arguments));
        Ok(Value::Null)
      }
      "analyzeImage" => {
        let (path, formats) = match arguments {
          Value::String(path) => (path.as_str(), FormatFilter::all()),
          _ => (
            arguments
              .get("filePath")
              .and_then(Value::as_str)
              .unwrap_or_default(),
            format_filter(arguments.get("formats")),
          ),
        };
        match self.analyzer.analyze(path, &formats)? {
          Some(result) => to_json(&result),
          None => Ok(Value::Null),
        }
      }
      other => Err(HandleError::NotImplemented(other.to_string())),
    }
  }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, HandleError> {
  serde_json::to_value(value).map_err(|e| HandleError::Scanner(ScannerError::generic(e)))
}

fn format_filter(value: Option<&Value>) -> FormatFilter {
  let codes: Vec<i64> = value
    .and_then(Value::as_array)
    .map(|codes| codes.iter().filter_map(Value::as_i64).collect())
    .unwrap_or_default();
  FormatFilter::from_codes(&codes)
}

/// 缺省参数：后置摄像头、闪光灯关闭、全部格式、不回传图片、不重复上报、不限超时
fn session_config(arguments: &Value) -> SessionConfig {
  let speed = match arguments.get("speed").and_then(Value::as_i64) {
    Some(code) => DetectionSpeed::from_code(code).unwrap_or_else(|| {
      warn!("未知的检测速度 {}，使用默认值", code);
      DetectionSpeed::default()
    }),
    None => DetectionSpeed::default(),
  };

  SessionConfig::default()
    .with_torch(arguments.get("torch").and_then(Value::as_bool).unwrap_or(false))
    .with_facing(
      arguments
        .get("facing")
        .and_then(Value::as_i64)
        .map(CameraFacing::from_code)
        .unwrap_or_default(),
    )
    .with_formats(format_filter(arguments.get("formats")))
    .with_return_image(
      arguments
        .get("returnImage")
        .and_then(Value::as_bool)
        .unwrap_or(false),
    )
    .with_speed(speed)
    .with_timeout_ms(
      arguments
        .get("timeout")
        .and_then(Value::as_u64)
        .unwrap_or(0),
    )
}

/// 缺少 `rect` 时清除窗口；格式不对时同样清除并告警
fn scan_window(arguments: &Value) -> Option<ScanWindow> {
  let rect = match arguments.get("rect") {
    None | Some(Value::Null) => return None,
    Some(rect) => rect,
  };

  let values: Option<Vec<f64>> = rect
    .as_array()
    .and_then(|values| values.iter().map(Value::as_f64).collect());
  match values.as_deref().map(|values| ScanWindow::try_from(values)) {
    Some(Ok(window)) => Some(window),
    _ => {
      warn!("无效的扫描窗口 {}，已清除", rect);
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn start_arguments_fall_back_to_defaults() {
    assert_eq!(session_config(&Value::Null), SessionConfig::default());
    assert_eq!(session_config(&json!({})), SessionConfig::default());
  }

  #[test]
  fn start_arguments_are_parsed() {
    let config = session_config(&json!({
      "torch": true,
      "facing": 0,
      "formats": [256, 32],
      "returnImage": true,
      "speed": 2,
      "timeout": 500,
    }));
    assert!(config.torch);
    assert_eq!(config.facing, CameraFacing::Front);
    assert_eq!(config.formats, FormatFilter::from_codes(&[256, 32]));
    assert!(config.return_image);
    assert_eq!(config.speed, DetectionSpeed::Unrestricted);
    assert_eq!(config.timeout, Some(std::time::Duration::from_millis(500)));
  }

  #[test]
  fn scan_window_arguments() {
    assert_eq!(
      scan_window(&json!({"rect": [0.1, 0.2, 0.9, 0.8]})),
      Some(ScanWindow::new(0.1, 0.2, 0.9, 0.8))
    );
    assert_eq!(scan_window(&json!({})), None);
    assert_eq!(scan_window(&json!({"rect": null})), None);
    assert_eq!(scan_window(&json!({"rect": [0.1, 0.2]})), None);
    assert_eq!(scan_window(&json!({"rect": ["a", 0.2, 0.3, 0.4]})), None);
  }
}
