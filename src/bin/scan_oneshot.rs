// 该文件是 Saoma （扫码） 项目的一部分。
// src/bin/scan_oneshot.rs - 识别单张图片
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

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::info;

use saoma::{ImageAnalyzer, barcode::FormatFilter, detector::QrDetector};

/// 识别单张图片中的条码，输出 JSON；没有结果时输出 null
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图片文件路径
  #[arg(long, value_name = "FILE")]
  pub image: PathBuf,

  /// 条码格式编码，逗号分隔，缺省为全部格式
  #[arg(long, value_delimiter = ',', value_name = "CODES")]
  pub formats: Vec<i64>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("图片路径: {}", args.image.display());

  let analyzer = ImageAnalyzer::new(Arc::new(QrDetector::new()));
  let now = std::time::Instant::now();
  let result = analyzer.analyze(&args.image, &FormatFilter::from_codes(&args.formats))?;
  info!("识别完成，耗时: {:.2?}", now.elapsed());

  println!("{}", serde_json::to_string(&result)?);
  Ok(())
}
