// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 数字卫兵 (Digital Sentinel) 核心库
//!
//! 多路摄像头人员检测流水线:
//! RTSP 拉流 → 共享检测器 → 每路独立跟踪 → 区域规则 (入侵/徘徊) → 事件存储 + 最新帧
pub mod config; // 运行参数
pub mod detection; // 检测 + 跟踪
pub mod error; // 错误类型
pub mod sink; // 事件/状态回写接口
pub mod store; // 摄像头登记表 + 事件存储
pub mod stream; // 视频会话 + 注册表
pub mod zones; // 区域规则

pub use crate::config::{Args, PipelineConfig};
pub use crate::error::{Result, SentinelError};
pub use crate::sink::{CameraStatus, EventSink, StatusSink};
pub use crate::stream::StreamRegistry;

/// 初始化日志 (RUST_LOG 优先, 否则使用给定级别)
pub fn init_logger(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
