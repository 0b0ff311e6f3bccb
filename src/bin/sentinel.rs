/// 数字卫兵 (Digital Sentinel)
///
/// 多路摄像头人员入侵/徘徊告警
///
/// 系统架构:
/// 1. 每路摄像头一个会话线程: 拉流 → 检测 → 跟踪 → 区域规则 → 事件
/// 2. 检测模型全局一份, 所有会话共享
/// 3. 主线程: 读取标准输入控制命令
///
/// 控制命令:
/// `reload` | `start <id>` | `stop <id>` | `snapshot <id> <path>` | `events [id]` | `list` | `quit`
use std::io::BufRead;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use mimalloc::MiMalloc;

use sentinel_rs::detection::YoloDetector;
use sentinel_rs::store::{CameraStore, FileEventStore};
use sentinel_rs::stream::{redact_url, FfmpegSource, StreamRegistry};
use sentinel_rs::{init_logger, Args};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// `events` 命令显示条数
const EVENTS_SHOWN: usize = 10;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);
    let config = args.pipeline_config();

    info!("🚀 数字卫兵系统启动");
    info!("📦 检测模型: {}", config.detector.model.display());
    info!(
        "📐 归一化分辨率: {}x{}",
        config.session.frame_width, config.session.frame_height
    );

    let cameras = Arc::new(
        CameraStore::open(&args.cameras)
            .with_context(|| format!("读取摄像头登记表失败: {}", args.cameras.display()))?,
    );
    info!("📁 摄像头登记表: {}", cameras.path().display());
    let events = Arc::new(
        FileEventStore::open(&args.data_dir)
            .with_context(|| format!("打开事件目录失败: {}", args.data_dir.display()))?,
    );
    let detector = Arc::new(
        YoloDetector::new(&config.detector)
            .with_context(|| format!("加载检测模型失败: {}", config.detector.model.display()))?,
    );
    let source = Arc::new(FfmpegSource::new(
        config.session.frame_width,
        config.session.frame_height,
        config.session.read_timeout,
    ));

    let registry = StreamRegistry::new(detector, source, events.clone(), cameras.clone(), config);

    // ========== 启动所有启用的摄像头 ==========
    let active = cameras.active();
    info!("📹 启用摄像头 {} 路", active.len());
    for camera in &active {
        if let Err(e) = registry.apply_camera(camera) {
            error!("❌ 摄像头 {} 启动失败: {}", camera.id, e);
        }
    }

    // ========== 主线程: 控制命令 ==========
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("⚠️ 读取标准输入失败: {}", e);
                break;
            }
        };
        match handle_command(line.trim(), &registry, &cameras, &events) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("❌ {:#}", e),
        }
    }

    registry.shutdown();
    info!("👋 数字卫兵已退出");
    Ok(())
}

/// 执行一条命令, 返回 false 表示退出
fn handle_command(
    line: &str,
    registry: &StreamRegistry,
    cameras: &CameraStore,
    events: &FileEventStore,
) -> Result<bool> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(true);
    };

    match cmd {
        "quit" | "exit" => return Ok(false),
        "reload" => {
            let list = cameras.load().context("重新读取摄像头登记表失败")?;
            // 已从登记表删除的摄像头
            for id in registry.camera_ids() {
                if !list.iter().any(|c| c.id == id) {
                    registry.stop_stream(id);
                }
            }
            for camera in &list {
                if let Err(e) = registry.apply_camera(camera) {
                    error!("❌ 摄像头 {} 启动失败: {}", camera.id, e);
                }
            }
            println!("✅ 已重新加载 {} 路摄像头", list.len());
        }
        "start" => {
            let id = parse_id(parts.next())?;
            let camera = cameras
                .get(id)
                .with_context(|| format!("摄像头 #{} 不存在", id))?;
            registry.add_or_replace_stream(id, &camera.rtsp_url, camera.zone_config.as_deref())?;
            println!("✅ 摄像头 {} 已启动: {}", id, redact_url(&camera.rtsp_url));
        }
        "stop" => {
            let id = parse_id(parts.next())?;
            if registry.stop_stream(id) {
                println!("🛑 摄像头 {} 已停止", id);
            } else {
                println!("摄像头 {} 未运行", id);
            }
        }
        "snapshot" => {
            let id = parse_id(parts.next())?;
            let path = parts.next().context("用法: snapshot <id> <path>")?;
            let frame = registry
                .get_latest_frame(id)
                .with_context(|| format!("摄像头 {} 暂无画面", id))?;
            std::fs::write(path, frame.as_slice()).with_context(|| format!("写入失败: {}", path))?;
            println!("✅ 已保存 {} ({} 字节)", path, frame.len());
        }
        "events" => {
            let camera_id = parts.next().map(|s| parse_id(Some(s))).transpose()?;
            println!("📁 事件目录: {}", events.dir().display());
            for record in events.list(camera_id, None, EVENTS_SHOWN) {
                println!(
                    "#{} [{}] 摄像头 {} {} ({:.2}) {}",
                    record.id,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.camera_id,
                    record.rule_name,
                    record.confidence,
                    record.snapshot_path.display()
                );
            }
        }
        "list" => {
            for camera in cameras.list() {
                let state = registry
                    .state(camera.id)
                    .map_or_else(|| "stopped".to_string(), |s| s.to_string());
                println!(
                    "#{} {} [{}] 登记状态={} 启用={}",
                    camera.id, camera.name, state, camera.status, camera.is_active
                );
            }
        }
        other => bail!("未知命令: {}", other),
    }
    Ok(true)
}

fn parse_id(arg: Option<&str>) -> Result<u64> {
    let arg = arg.context("缺少摄像头ID")?;
    arg.parse()
        .with_context(|| format!("无效的摄像头ID: {}", arg))
}
