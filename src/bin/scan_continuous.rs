// 该文件是 Saoma （扫码） 项目的一部分。
// src/bin/scan_continuous.rs - 连续扫码
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

use std::{sync::mpsc, thread, time::Duration};

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use saoma::{
  FromUrl, Scanner, ScannerEvent, ScannerOptions, SessionConfig,
  barcode::FormatFilter,
  camera::{CameraFacing, CameraWrapper},
  detector::{DetectionSpeed, QrDetector},
  geometry::ScanWindow,
};

/// 连续扫码，每个事件输出一行 JSON
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 摄像头来源，例如 v4l:///dev/video0 或 image:///tmp/code.png?interval=100
  #[arg(long, value_name = "CAMERA")]
  pub camera: Url,

  /// 摄像头朝向: front 或 back
  #[arg(long, default_value = "back", value_name = "FACING")]
  pub facing: String,

  /// 启动时打开闪光灯
  #[arg(long)]
  pub torch: bool,

  /// 条码格式编码，逗号分隔，缺省为全部格式
  #[arg(long, value_delimiter = ',', value_name = "CODES")]
  pub formats: Vec<i64>,

  /// 在结果中附带 JPEG 图像
  #[arg(long)]
  pub return_image: bool,

  /// 检测速度: 0 不重复上报, 1 正常, 2 不限制
  #[arg(long, default_value = "0", value_name = "SPEED")]
  pub speed: i64,

  /// 结果超时（毫秒），0 表示不限制
  #[arg(long, default_value = "0", value_name = "MS")]
  pub timeout: u64,

  /// 归一化扫描窗口: minX,minY,maxX,maxY
  #[arg(long, value_delimiter = ',', num_args = 4, value_name = "RECT")]
  pub scan_window: Option<Vec<f64>>,

  /// 收到指定数量的识别结果后退出
  #[arg(long, value_name = "COUNT")]
  pub frame_number: Option<usize>,

  /// 停止时等待采集线程的最长时间（毫秒）
  #[arg(long, default_value = "2000", value_name = "MS")]
  pub stop_timeout: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("摄像头来源: {}", args.camera);

  let facing = CameraFacing::from_name(&args.facing)
    .ok_or_else(|| anyhow!("未知的摄像头朝向: {}", args.facing))?;
  let speed = DetectionSpeed::from_code(args.speed)
    .ok_or_else(|| anyhow!("未知的检测速度: {}", args.speed))?;
  let scan_window = args
    .scan_window
    .as_deref()
    .map(|rect| ScanWindow::try_from(rect))
    .transpose()
    .map_err(|len| anyhow!("扫描窗口需要 4 个数值，实际为 {}", len))?;

  let camera = CameraWrapper::from_url(&args.camera)?;
  let options = ScannerOptions::default()
    .with_stop_timeout(Duration::from_millis(args.stop_timeout))
    .with_scan_window(scan_window);
  let (scanner, events) = Scanner::new(camera, QrDetector::new(), options);

  let config = SessionConfig::default()
    .with_facing(facing)
    .with_torch(args.torch)
    .with_formats(FormatFilter::from_codes(&args.formats))
    .with_return_image(args.return_image)
    .with_speed(speed)
    .with_timeout_ms(args.timeout);
  let handle = scanner.controller().start(config)?;
  println!("{}", serde_json::to_string(&handle)?);

  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let mut reported = 0;
  loop {
    if rx.try_recv().is_ok() {
      warn!("中断信号接收，退出扫码循环");
      break;
    }

    let Some(event) = events.recv_timeout(Duration::from_millis(100)) else {
      continue;
    };
    println!("{}", serde_json::to_string(&event)?);

    if let ScannerEvent::Barcode(_) = event {
      reported += 1;
      if args.frame_number.map(|n| reported >= n).unwrap_or(false) {
        info!("已收到 {} 次识别结果，退出扫码循环", reported);
        break;
      }
    }
  }

  scanner.controller().stop();
  info!("扫码结束");
  Ok(())
}
