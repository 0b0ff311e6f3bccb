//! 单路视频会话 (Stream session)
//!
//! 每路摄像头一个工作线程:
//! 打开视频源 → 读帧 → 归一化 → 检测 (共享) → 跟踪 → 区域规则 → 事件存储 → 标注 → 发布最新帧
//!
//! 状态机:
//! `Disconnected → Connecting → Online`, 读帧失败或流关闭 `Online → Offline`,
//! 重试 `Offline → Connecting`, 停止请求后进入终态 `Stopped`。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::RgbImage;
use log::{debug, error, info, warn};

use super::annotate::Annotator;
use super::capture::{redact_url, Capture, FrameSource};
use super::frame::{encode_jpeg, normalize, FrameSlot};
use crate::config::{PipelineConfig, SessionConfig};
use crate::detection::{filter_classes, BBox, CentroidTracker, Detector};
use crate::sink::{CameraStatus, EventSink, StatusSink};
use crate::zones::{AlertEvent, Zone, ZoneRuleEngine};
use crate::Result;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Online,
    Offline,
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Online => "online",
            ConnectionState::Offline => "offline",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// 停止信号
///
/// 标志位 + 通道: `stop()` 丢弃发送端, 正在 `wait` 的线程立即被唤醒。
pub struct StopSignal {
    stopped: AtomicBool,
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Default for StopSignal {
    fn default() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            stopped: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// 可中断等待, 返回 true 表示已收到停止请求
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            _ => self.is_stopped(),
        }
    }
}

/// 会话依赖的外部协作者 (所有会话共享)
#[derive(Clone)]
pub struct SessionDeps {
    pub detector: Arc<dyn Detector>,
    pub source: Arc<dyn FrameSource>,
    pub events: Arc<dyn EventSink>,
    pub status: Arc<dyn StatusSink>,
}

/// 吞吐统计
#[derive(Default)]
struct SessionStats {
    frames: u64,
    window_frames: u64,
    window_start: Option<Instant>,
    detect_time: Duration,
    detect_errors: u64,
    alerts: u64,
}

pub struct StreamSession {
    camera_id: u64,
    url: String,
    config: SessionConfig,
    deps: SessionDeps,

    tracker: CentroidTracker,
    rules: ZoneRuleEngine,
    annotator: Annotator,

    capture: Option<Box<dyn Capture>>,
    slot: Arc<FrameSlot>,
    state: Arc<Mutex<ConnectionState>>,
    stop: Arc<StopSignal>,
    reported: Option<CameraStatus>,
    stats: SessionStats,
}

impl StreamSession {
    /// 创建会话 (区域配置在此解析一次, 无效配置按无区域处理)
    pub fn new(
        camera_id: u64,
        url: impl Into<String>,
        zone_config: Option<&str>,
        deps: SessionDeps,
        config: &PipelineConfig,
    ) -> Self {
        let zones = Zone::parse_or_empty(camera_id, zone_config);
        let annotator = Annotator::new(config.session.font_path.as_deref());
        Self {
            camera_id,
            url: url.into(),
            config: config.session.clone(),
            deps,
            tracker: CentroidTracker::new(config.tracker),
            rules: ZoneRuleEngine::new(camera_id, zones, config.rules),
            annotator,
            capture: None,
            slot: Arc::new(FrameSlot::new()),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            stop: Arc::new(StopSignal::new()),
            reported: None,
            stats: SessionStats::default(),
        }
    }

    /// 启动工作线程
    pub fn spawn(self) -> Result<SessionHandle> {
        let camera_id = self.camera_id;
        let slot = self.slot.clone();
        let state = self.state.clone();
        let stop = self.stop.clone();

        let thread = thread::Builder::new()
            .name(format!("camera-{}", camera_id))
            .spawn(move || self.run())?;

        Ok(SessionHandle {
            camera_id,
            slot,
            state,
            stop,
            thread: Some(thread),
        })
    }

    /// 会话主循环, 直到收到停止请求
    pub fn run(mut self) {
        info!(
            "📹 摄像头 {} 会话启动: {} ({} 个区域)",
            self.camera_id,
            redact_url(&self.url),
            self.rules.zones().len()
        );

        while !self.stop.is_stopped() {
            if !self.capture.as_ref().is_some_and(|c| c.is_open()) {
                // 流已结束: 先回写离线再重连
                if self.capture.take().is_some() {
                    warn!("⚠️ 摄像头 {} 视频流已关闭", self.camera_id);
                    self.set_state(ConnectionState::Offline);
                }
                if !self.connect() {
                    if self.stop.wait(self.config.reconnect_backoff) {
                        break;
                    }
                    continue;
                }
            }

            let read = match self.capture.as_mut() {
                Some(capture) => capture.read(),
                None => continue,
            };
            match read {
                Ok(frame) => self.process_frame(frame),
                Err(e) => {
                    warn!("⚠️ 摄像头 {} 读帧失败: {}", self.camera_id, e);
                    self.capture = None;
                    self.set_state(ConnectionState::Offline);
                }
            }
        }

        // 释放连接, 最后一次回写离线
        self.capture = None;
        self.set_state(ConnectionState::Stopped);
        self.report(CameraStatus::Offline);
        info!(
            "🛑 摄像头 {} 会话已停止 (共 {} 帧, {} 条告警)",
            self.camera_id, self.stats.frames, self.stats.alerts
        );
    }

    fn connect(&mut self) -> bool {
        self.set_state(ConnectionState::Connecting);
        match self.deps.source.open(&self.url) {
            Ok(capture) => {
                self.capture = Some(capture);
                self.set_state(ConnectionState::Online);
                true
            }
            Err(e) => {
                warn!(
                    "⚠️ 摄像头 {} 连接失败, {:?} 后重试: {}",
                    self.camera_id, self.config.reconnect_backoff, e
                );
                self.set_state(ConnectionState::Offline);
                false
            }
        }
    }

    fn process_frame(&mut self, frame: RgbImage) {
        let frame = match normalize(frame, self.config.frame_width, self.config.frame_height) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("⚠️ 摄像头 {} 帧归一化失败: {}", self.camera_id, e);
                return;
            }
        };
        // 驻留/冷却用单调时钟, 事件时间戳用墙钟
        let now = Instant::now();
        let timestamp = Utc::now();

        let t_detect = Instant::now();
        let detected = self.deps.detector.detect(&frame);
        self.stats.detect_time += t_detect.elapsed();

        let (alerts, detections) = match detected {
            Ok(detections) => {
                let people = filter_classes(&detections, &self.config.classes);
                let boxes: Vec<BBox> = people.iter().map(|d| d.bbox).collect();
                self.tracker.update(&boxes);
                let alerts = self
                    .rules
                    .evaluate(self.tracker.objects_mut(), now, timestamp);
                (alerts, Some(detections))
            }
            Err(e) => {
                // 本帧跳过跟踪与规则
                self.stats.detect_errors += 1;
                warn!(
                    "⚠️ 摄像头 {} 检测失败 ({}): {}",
                    self.camera_id,
                    self.deps.detector.name(),
                    e
                );
                (Vec::new(), None)
            }
        };

        if !alerts.is_empty() {
            self.save_alerts(&alerts, &frame);
        }

        let mut annotated = frame;
        match &detections {
            Some(detections) => self.annotator.draw(
                &mut annotated,
                self.rules.zones(),
                detections,
                self.tracker.objects(),
            ),
            None => self
                .annotator
                .draw(&mut annotated, self.rules.zones(), &[], std::iter::empty()),
        }
        match encode_jpeg(&annotated, self.config.jpeg_quality) {
            Ok(jpeg) => {
                self.slot.publish(jpeg);
            }
            Err(e) => warn!("⚠️ 摄像头 {} 帧编码失败: {}", self.camera_id, e),
        }

        self.record_frame();
    }

    /// 逐条保存, 单条失败不影响其余告警
    fn save_alerts(&mut self, alerts: &[AlertEvent], frame: &RgbImage) {
        let snapshot = match encode_jpeg(frame, self.config.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                error!(
                    "❌ 摄像头 {} 快照编码失败, 丢弃 {} 条告警: {}",
                    self.camera_id,
                    alerts.len(),
                    e
                );
                return;
            }
        };

        for alert in alerts {
            match self.deps.events.save(alert, &snapshot) {
                Ok(event_id) => {
                    self.stats.alerts += 1;
                    info!(
                        "🚨 摄像头 {} 事件 #{}: {} (目标 #{})",
                        self.camera_id, event_id, alert.rule_name, alert.object_id
                    );
                }
                Err(e) => error!(
                    "❌ 摄像头 {} 事件保存失败 '{}': {}",
                    self.camera_id, alert.rule_name, e
                ),
            }
        }
    }

    fn record_frame(&mut self) {
        let stats = &mut self.stats;
        stats.frames += 1;
        stats.window_frames += 1;
        let start = *stats.window_start.get_or_insert_with(Instant::now);

        if self.config.stats_interval == 0 || stats.window_frames < self.config.stats_interval {
            return;
        }
        let elapsed = start.elapsed().as_secs_f64().max(1e-6);
        debug!(
            "📊 摄像头 {}: {:.1} fps | 检测 {:.1} ms/帧 | 目标 {} | 检测失败 {}",
            self.camera_id,
            stats.window_frames as f64 / elapsed,
            stats.detect_time.as_secs_f64() * 1000.0 / stats.window_frames as f64,
            self.tracker.track_count(),
            stats.detect_errors
        );
        stats.window_frames = 0;
        stats.window_start = Some(Instant::now());
        stats.detect_time = Duration::ZERO;
    }

    fn set_state(&mut self, state: ConnectionState) {
        let prev = {
            let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, state)
        };
        if prev != state {
            debug!("摄像头 {} 状态: {} → {}", self.camera_id, prev, state);
        }

        let status = match state {
            ConnectionState::Online => CameraStatus::Online,
            ConnectionState::Offline => CameraStatus::Offline,
            _ => return,
        };
        if self.reported != Some(status) {
            self.report(status);
        }
    }

    /// 状态回写失败只记日志
    fn report(&mut self, status: CameraStatus) {
        self.reported = Some(status);
        if let Err(e) = self.deps.status.set_status(self.camera_id, status) {
            warn!(
                "⚠️ 摄像头 {} 状态回写失败 ({}): {}",
                self.camera_id, status, e
            );
        }
    }
}

/// 会话句柄 (注册表持有), 丢弃时停止并等待线程退出
pub struct SessionHandle {
    camera_id: u64,
    slot: Arc<FrameSlot>,
    state: Arc<Mutex<ConnectionState>>,
    stop: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn camera_id(&self) -> u64 {
        self.camera_id
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn latest_frame(&self) -> Option<Arc<Vec<u8>>> {
        self.slot.latest()
    }

    /// 仅发出停止请求, 不等待
    pub fn request_stop(&self) {
        self.stop.stop();
    }

    /// 停止并等待线程退出 (释放连接并回写离线后返回)
    pub fn stop_and_join(&mut self) {
        self.stop.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("❌ 摄像头 {} 会话线程异常退出", self.camera_id);
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_interrupts_wait() {
        let signal = Arc::new(StopSignal::new());
        assert!(!signal.wait(Duration::from_millis(10)));

        let stopper = {
            let signal = signal.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                signal.stop();
            })
        };
        let start = Instant::now();
        assert!(signal.wait(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();

        // 停止后立即返回
        assert!(signal.wait(Duration::from_secs(30)));
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Online.to_string(), "online");
        assert_eq!(ConnectionState::Stopped.to_string(), "stopped");
    }
}
