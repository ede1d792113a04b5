// 该文件是 Saoma （扫码） 项目的一部分。
// tests/session.rs - 会话状态机测试
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

mod common;

use std::{
  sync::{Arc, atomic::Ordering},
  thread,
  time::{Duration, Instant},
};

use common::{ScriptedCamera, ScriptedDetector, drain, open_gate, square, wait_for};
use saoma::{
  ScannerError, ScannerEvent, ScannerOptions, SessionConfig, SessionController, SessionState,
  camera::{CameraFacing, TorchState},
  detector::DetectionSpeed,
  geometry::ScanWindow,
};

fn controller(
  camera: ScriptedCamera,
  detector: ScriptedDetector,
) -> (
  SessionController<ScriptedCamera, ScriptedDetector>,
  saoma::EventStream,
) {
  SessionController::new(camera, Arc::new(detector), ScannerOptions::default())
}

fn is_barcode(event: &ScannerEvent) -> bool {
  matches!(event, ScannerEvent::Barcode(_))
}

#[test]
fn start_returns_handle_and_streams_results() {
  let (controller, events) = controller(
    ScriptedCamera::default(),
    ScriptedDetector::returning(vec![square("hello", 10.0, 30.0)]),
  );

  let handle = controller.start(SessionConfig::default()).unwrap();
  assert_eq!(handle.texture_id, 42);
  assert_eq!((handle.size.width, handle.size.height), (100, 100));
  assert_eq!(handle.current_torch_state, TorchState::Off);
  assert_eq!(controller.state(), SessionState::Running);
  assert_eq!(controller.handle(), Some(handle));

  match wait_for(&events, is_barcode) {
    Some(ScannerEvent::Barcode(event)) => {
      assert_eq!(event.barcodes.len(), 1);
      assert_eq!(event.barcodes[0].raw_value(), Some("hello"));
      assert_eq!(event.image.bytes, None);
      assert_eq!((event.image.width, event.image.height), (100, 100));
    }
    other => panic!("unexpected event: {:?}", other),
  }

  controller.stop();
  assert_eq!(controller.state(), SessionState::Stopped);
}

#[test]
fn second_start_is_rejected_without_disturbing_first() {
  let camera = ScriptedCamera::default();
  let counters = camera.counters.clone();
  let (controller, events) = controller(
    camera,
    ScriptedDetector::returning(vec![square("a", 10.0, 30.0)]),
  );

  controller.start(SessionConfig::default()).unwrap();
  assert_eq!(
    controller.start(SessionConfig::default()),
    Err(ScannerError::AlreadyStarted)
  );
  assert_eq!(controller.state(), SessionState::Running);
  assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
  assert!(wait_for(&events, is_barcode).is_some());

  controller.stop();
}

#[test]
fn zoom_requires_running_session() {
  let (controller, _events) = controller(ScriptedCamera::default(), ScriptedDetector::default());

  assert_eq!(controller.set_scale(2.0), Err(ScannerError::ZoomWhenStopped));
  assert_eq!(controller.reset_scale(), Err(ScannerError::ZoomWhenStopped));
}

#[test]
fn missing_facing_reports_no_camera() {
  let (controller, _events) = controller(ScriptedCamera::default(), ScriptedDetector::default());

  let front = SessionConfig::default().with_facing(CameraFacing::Front);
  assert_eq!(controller.start(front), Err(ScannerError::NoCamera));
  assert_eq!(controller.state(), SessionState::Stopped);

  controller.start(SessionConfig::default()).unwrap();
  controller.stop();
}

#[test]
fn capture_config_reaches_device() {
  let camera = ScriptedCamera::default();
  let counters = camera.counters.clone();
  let (controller, _events) = controller(camera, ScriptedDetector::default());

  controller
    .start(SessionConfig::default().with_timeout_ms(750))
    .unwrap();
  let config = counters.last_config.lock().unwrap().clone().unwrap();
  assert_eq!(config.facing, CameraFacing::Back);
  assert_eq!(config.timeout, Some(Duration::from_millis(750)));
  controller.stop();
}

#[test]
fn zoom_events_carry_applied_scale() {
  let (controller, events) = controller(ScriptedCamera::default(), ScriptedDetector::default());
  controller.start(SessionConfig::default()).unwrap();

  controller.set_scale(2.0).unwrap();
  controller.reset_scale().unwrap();

  let zooms: Vec<_> = drain(&events)
    .into_iter()
    .filter_map(|event| match event {
      ScannerEvent::ZoomScaleState(scale) => Some(scale),
      _ => None,
    })
    .collect();
  assert_eq!(zooms, vec![2.0, 1.0]);

  controller.stop();
}

#[test]
fn invalid_zoom_is_reported() {
  let (controller, events) = controller(ScriptedCamera::default(), ScriptedDetector::default());
  controller.start(SessionConfig::default()).unwrap();

  assert_eq!(controller.set_scale(9.0).map_err(|e| e.code()), Err("ZOOM_ERROR"));
  assert_eq!(
    controller.set_scale(f64::NAN).map_err(|e| e.code()),
    Err("GENERIC_ERROR")
  );
  assert!(
    drain(&events)
      .iter()
      .all(|event| !matches!(event, ScannerEvent::ZoomScaleState(_)))
  );

  controller.stop();
}

#[test]
fn torch_toggles_and_reports_state() {
  let (controller, events) = controller(ScriptedCamera::default(), ScriptedDetector::default());

  controller.toggle_torch();
  assert!(drain(&events).is_empty());

  controller.start(SessionConfig::default()).unwrap();
  controller.toggle_torch();
  controller.toggle_torch();

  let torch: Vec<_> = drain(&events)
    .into_iter()
    .filter_map(|event| match event {
      ScannerEvent::TorchState(state) => Some(state),
      _ => None,
    })
    .collect();
  assert_eq!(torch, vec![TorchState::On, TorchState::Off]);

  controller.stop();
}

#[test]
fn torch_failure_is_silent() {
  let camera = ScriptedCamera {
    has_torch: false,
    ..Default::default()
  };
  let (controller, events) = controller(camera, ScriptedDetector::default());

  let handle = controller
    .start(SessionConfig::default().with_torch(true))
    .unwrap();
  assert_eq!(handle.current_torch_state, TorchState::Unavailable);

  controller.toggle_torch();
  assert!(
    drain(&events)
      .iter()
      .all(|event| !matches!(event, ScannerEvent::TorchState(_)))
  );

  controller.stop();
}

#[test]
fn stop_succeeds_even_if_release_fails() {
  let camera = ScriptedCamera {
    fail_release: true,
    ..Default::default()
  };
  let counters = camera.counters.clone();
  let (controller, _events) = controller(camera, ScriptedDetector::default());

  controller.stop();
  controller.start(SessionConfig::default()).unwrap();
  controller.stop();
  assert_eq!(controller.state(), SessionState::Stopped);
  assert_eq!(counters.released.load(Ordering::SeqCst), 1);

  controller.start(SessionConfig::default()).unwrap();
  controller.stop();
  assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
}

#[test]
fn no_events_after_stop() {
  let (controller, events) = controller(
    ScriptedCamera::default(),
    ScriptedDetector::returning(vec![square("a", 10.0, 30.0)]),
  );
  let config = SessionConfig::default().with_speed(DetectionSpeed::Unrestricted);

  controller.start(config).unwrap();
  assert!(wait_for(&events, is_barcode).is_some());
  controller.stop();

  drain(&events);
  thread::sleep(Duration::from_millis(50));
  assert!(drain(&events).is_empty());
}

#[test]
fn scan_window_filters_results() {
  let (controller, events) = controller(
    ScriptedCamera::default(),
    ScriptedDetector::returning(vec![
      square("outside", 0.0, 20.0),
      square("inside", 40.0, 60.0),
    ]),
  );

  controller.update_scan_window(Some(ScanWindow::new(0.25, 0.25, 0.75, 0.75)));
  assert_eq!(
    controller.scan_window(),
    Some(ScanWindow::new(0.25, 0.25, 0.75, 0.75))
  );
  controller.start(SessionConfig::default()).unwrap();

  match wait_for(&events, is_barcode) {
    Some(ScannerEvent::Barcode(event)) => {
      let values: Vec<_> = event.barcodes.iter().map(|b| b.raw_value()).collect();
      assert_eq!(values, vec![Some("inside")]);
    }
    other => panic!("unexpected event: {:?}", other),
  }

  controller.stop();
}

#[test]
fn return_image_attaches_jpeg() {
  let (controller, events) = controller(
    ScriptedCamera::default(),
    ScriptedDetector::returning(vec![square("a", 10.0, 30.0)]),
  );
  controller
    .start(SessionConfig::default().with_return_image(true))
    .unwrap();

  match wait_for(&events, is_barcode) {
    Some(ScannerEvent::Barcode(event)) => {
      let bytes = event.image.bytes.expect("jpeg bytes");
      assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
    other => panic!("unexpected event: {:?}", other),
  }

  controller.stop();
}

#[test]
fn detector_failure_becomes_barcode_error() {
  let (controller, events) =
    controller(ScriptedCamera::default(), ScriptedDetector::failing("model crashed"));
  controller.start(SessionConfig::default()).unwrap();

  match wait_for(&events, |event| matches!(event, ScannerEvent::Error(_))) {
    Some(ScannerEvent::Error(error)) => {
      assert_eq!(error.code(), "BARCODE_ERROR");
      assert!(error.to_string().contains("model crashed"));
    }
    other => panic!("unexpected event: {:?}", other),
  }

  controller.stop();
}

#[test]
fn capture_failure_reports_camera_error() {
  let camera = ScriptedCamera {
    fail_after: Some(2),
    ..Default::default()
  };
  let (controller, events) = controller(camera, ScriptedDetector::default());
  controller.start(SessionConfig::default()).unwrap();

  match wait_for(&events, |event| matches!(event, ScannerEvent::Error(_))) {
    Some(ScannerEvent::Error(error)) => assert_eq!(error.code(), "CAMERA_ERROR"),
    other => panic!("unexpected event: {:?}", other),
  }
  assert_eq!(controller.state(), SessionState::Running);

  controller.stop();
  assert_eq!(controller.state(), SessionState::Stopped);
}

#[test]
fn dropping_controller_releases_camera() {
  let camera = ScriptedCamera::default();
  let counters = camera.counters.clone();
  let (controller, _events) = controller(camera, ScriptedDetector::default());

  controller.start(SessionConfig::default()).unwrap();
  drop(controller);
  assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_gives_up_on_wedged_capture_thread() {
  let camera = ScriptedCamera {
    wedged: true,
    ..Default::default()
  };
  let counters = camera.counters.clone();
  let options = ScannerOptions::default().with_stop_timeout(Duration::from_millis(100));
  let (controller, _events) =
    SessionController::new(camera, Arc::new(ScriptedDetector::default()), options);

  controller.start(SessionConfig::default()).unwrap();
  let begin = Instant::now();
  controller.stop();
  assert!(begin.elapsed() < Duration::from_secs(1));
  assert_eq!(controller.state(), SessionState::Stopped);
  assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_while_starting_cancels_the_start() {
  let (gate, handle) = open_gate();
  let camera = ScriptedCamera {
    gate: Some(gate),
    ..Default::default()
  };
  let counters = camera.counters.clone();
  let (controller, events) = controller(camera, ScriptedDetector::default());

  thread::scope(|scope| {
    let starter = scope.spawn(|| controller.start(SessionConfig::default()));

    handle.wait_entered();
    assert_eq!(controller.state(), SessionState::Starting);
    assert_eq!(controller.set_scale(2.0), Err(ScannerError::ZoomWhenStopped));
    assert_eq!(
      controller.start(SessionConfig::default()),
      Err(ScannerError::AlreadyStarted)
    );
    controller.stop();
    assert_eq!(controller.state(), SessionState::Stopped);

    handle.open();
    let started = starter.join().unwrap();
    assert!(matches!(started, Err(ScannerError::Generic(_))));
  });

  assert_eq!(counters.released.load(Ordering::SeqCst), 1);
  assert_eq!(controller.state(), SessionState::Stopped);
  assert!(
    drain(&events)
      .iter()
      .all(|event| !matches!(event, ScannerEvent::ZoomScaleState(_)))
  );
}
