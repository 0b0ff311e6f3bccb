//! 配置参数 (Configuration)
//!
//! - `Args`: 命令行参数 (clap), 仅供主程序使用
//! - `PipelineConfig`: 传入库内部的运行参数, 各字段默认值即推荐值

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// 跟踪器参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// 连续丢失超过该帧数后注销目标
    pub max_disappeared: u32,
    /// 最大关联距离 (640x480 坐标系, 像素)
    pub max_association_distance: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_disappeared: 5,
            max_association_distance: 100.0,
        }
    }
}

/// 区域规则参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// 入侵窗口: 进入区域后该时长内判定为入侵
    pub intrusion_window: Duration,
    /// 徘徊阈值: 停留超过该时长判定为徘徊
    pub loitering_threshold: Duration,
    /// 同一告警键的冷却时间
    pub cooldown: Duration,
    /// 去重表过期时间 (None = 永不清理)
    pub dedup_ttl: Option<Duration>,
    /// 告警固定置信度 (跟踪器不保留检测置信度)
    pub alert_confidence: f32,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            intrusion_window: Duration::from_secs(2),
            loitering_threshold: Duration::from_secs(5),
            cooldown: Duration::from_secs(10),
            dedup_ttl: None,
            alert_confidence: 0.9,
        }
    }
}

/// 单路视频会话参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 归一化分辨率
    pub frame_width: u32,
    pub frame_height: u32,
    /// 重连等待 (可被停止请求打断)
    pub reconnect_backoff: Duration,
    /// 单帧读取超时
    pub read_timeout: Duration,
    /// 关注的类别标签
    pub classes: Vec<String>,
    /// 实时画面JPEG质量
    pub jpeg_quality: u8,
    /// 标注字体 (TTF/OTF), 为空则只画框
    pub font_path: Option<PathBuf>,
    /// 统计日志间隔 (帧)
    pub stats_interval: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_width: 640,
            frame_height: 480,
            reconnect_backoff: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            classes: vec!["person".to_string()],
            jpeg_quality: 80,
            font_path: None,
            stats_interval: 60,
        }
    }
}

/// 检测模型参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: PathBuf,
    pub input_size: u32,
    pub conf: f32,
    pub iou: f32,
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/yolov8n.onnx"),
            input_size: 640,
            conf: 0.25,
            iou: 0.45,
            intra_threads: 4,
        }
    }
}

/// 流水线总配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub rules: RuleConfig,
    pub session: SessionConfig,
    pub detector: DetectorConfig,
}

/// 数字卫兵参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "数字卫兵 - 多路摄像头入侵/徘徊告警", long_about = None)]
pub struct Args {
    /// 摄像头配置文件 (JSON数组)
    #[arg(long, default_value = "data/cameras.json")]
    pub cameras: PathBuf,

    /// 数据目录 (事件日志 + 快照)
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// ONNX检测模型
    #[arg(short, long, default_value = "models/yolov8n.onnx")]
    pub model: PathBuf,

    /// 置信度阈值
    #[arg(long, default_value_t = 0.25)]
    pub conf: f32,

    /// NMS IOU阈值
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// 模型输入尺寸
    #[arg(long, default_value_t = 640)]
    pub input_size: u32,

    /// 推理线程数
    #[arg(long, default_value_t = 4)]
    pub threads: usize,

    /// 归一化宽度
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// 归一化高度
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// 重连等待 (秒)
    #[arg(long, default_value_t = 5)]
    pub reconnect_secs: u64,

    /// 读帧超时 (秒)
    #[arg(long, default_value_t = 10)]
    pub read_timeout_secs: u64,

    /// 目标最大丢失帧数
    #[arg(long, default_value_t = 5)]
    pub max_disappeared: u32,

    /// 最大关联距离 (像素)
    #[arg(long, default_value_t = 100.0)]
    pub max_distance: f32,

    /// 入侵窗口 (秒)
    #[arg(long, default_value_t = 2.0)]
    pub intrusion_secs: f64,

    /// 徘徊阈值 (秒)
    #[arg(long, default_value_t = 5.0)]
    pub loitering_secs: f64,

    /// 告警冷却 (秒)
    #[arg(long, default_value_t = 10.0)]
    pub cooldown_secs: f64,

    /// 去重表过期 (秒), 不设置则不清理
    #[arg(long)]
    pub dedup_ttl_secs: Option<f64>,

    /// JPEG质量
    #[arg(long, default_value_t = 80)]
    pub jpeg_quality: u8,

    /// 标注字体文件
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            tracker: TrackerConfig {
                max_disappeared: self.max_disappeared,
                max_association_distance: self.max_distance,
            },
            rules: RuleConfig {
                intrusion_window: secs(self.intrusion_secs),
                loitering_threshold: secs(self.loitering_secs),
                cooldown: secs(self.cooldown_secs),
                dedup_ttl: self.dedup_ttl_secs.map(secs),
                ..RuleConfig::default()
            },
            session: SessionConfig {
                frame_width: self.width,
                frame_height: self.height,
                reconnect_backoff: Duration::from_secs(self.reconnect_secs),
                read_timeout: Duration::from_secs(self.read_timeout_secs),
                jpeg_quality: self.jpeg_quality,
                font_path: self.font.clone(),
                ..SessionConfig::default()
            },
            detector: DetectorConfig {
                model: self.model.clone(),
                input_size: self.input_size,
                conf: self.conf,
                iou: self.iou,
                intra_threads: self.threads,
            },
        }
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.tracker.max_disappeared, 5);
        assert_eq!(config.tracker.max_association_distance, 100.0);
        assert_eq!(config.rules.intrusion_window, Duration::from_secs(2));
        assert_eq!(config.rules.loitering_threshold, Duration::from_secs(5));
        assert_eq!(config.rules.cooldown, Duration::from_secs(10));
        assert_eq!(config.session.reconnect_backoff, Duration::from_secs(5));
        assert_eq!((config.session.frame_width, config.session.frame_height), (640, 480));
    }

    #[test]
    fn test_args_match_defaults() {
        let args = Args::parse_from(["sentinel"]);
        let config = args.pipeline_config();
        assert_eq!(config.tracker, TrackerConfig::default());
        assert_eq!(config.rules, RuleConfig::default());
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"tracker": {"max_disappeared": 8}}"#).unwrap();
        assert_eq!(config.tracker.max_disappeared, 8);
        assert_eq!(config.tracker.max_association_distance, 100.0);
        assert_eq!(config.rules, RuleConfig::default());
    }
}
