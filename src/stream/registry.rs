//! 会话注册表 (Stream registry)
//!
//! 摄像头ID → 会话句柄。同一摄像头的增/删操作互斥, 且旧会话完全退出后才启动新会话。
//! 会话表锁只在增删条目时短暂持有, 停止/等待线程在锁外进行。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;

use super::capture::FrameSource;
use super::frame::FrameSlot;
use super::session::{ConnectionState, SessionDeps, SessionHandle, StreamSession};
use crate::config::PipelineConfig;
use crate::detection::Detector;
use crate::sink::{EventSink, StatusSink};
use crate::store::Camera;
use crate::{Result, SentinelError};

pub struct StreamRegistry {
    deps: SessionDeps,
    config: PipelineConfig,
    sessions: Mutex<HashMap<u64, SessionHandle>>,
    /// 每个摄像头一把操作锁
    ops: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
    closed: AtomicBool,
}

impl StreamRegistry {
    /// 创建注册表, 检测器只在这里持有一份, 由所有会话共享
    pub fn new(
        detector: Arc<dyn Detector>,
        source: Arc<dyn FrameSource>,
        events: Arc<dyn EventSink>,
        status: Arc<dyn StatusSink>,
        config: PipelineConfig,
    ) -> Self {
        info!("✅ 会话注册表就绪 (检测器: {})", detector.name());
        Self {
            deps: SessionDeps {
                detector,
                source,
                events,
                status,
            },
            config,
            sessions: Mutex::new(HashMap::new()),
            ops: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<u64, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn op_lock(&self, camera_id: u64) -> Arc<Mutex<()>> {
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(camera_id)
            .or_default()
            .clone()
    }

    /// 无其他持有者时移除操作锁, 操作锁表只保留有会话或有进行中操作的摄像头
    fn release_op_lock(&self, camera_id: u64, op: Arc<Mutex<()>>) {
        let mut ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        // 表内一份 + 调用方一份
        let idle = Arc::strong_count(&op) == 2;
        if idle && ops.get(&camera_id).is_some_and(|o| Arc::ptr_eq(o, &op)) {
            ops.remove(&camera_id);
        }
    }

    #[cfg(test)]
    fn op_lock_count(&self) -> usize {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 启动 (或替换) 一路会话
    ///
    /// 已有会话时先停止并等待其退出 (释放连接, 回写离线), 再启动新会话。
    pub fn add_or_replace_stream(
        &self,
        camera_id: u64,
        rtsp_url: &str,
        zone_config: Option<&str>,
    ) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SentinelError::Closed);
        }

        let op = self.op_lock(camera_id);
        let _guard = op.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.sessions().remove(&camera_id);
        if let Some(mut previous) = previous {
            info!("🔄 摄像头 {} 替换会话", camera_id);
            previous.stop_and_join();
        }

        let handle = StreamSession::new(
            camera_id,
            rtsp_url,
            zone_config,
            self.deps.clone(),
            &self.config,
        )
        .spawn()?;

        let rejected = {
            let mut sessions = self.sessions();
            if self.closed.load(Ordering::Acquire) {
                Some(handle)
            } else {
                sessions.insert(camera_id, handle);
                None
            }
        };
        // 并发关闭: 锁外停止刚启动的会话
        if let Some(mut handle) = rejected {
            handle.stop_and_join();
            return Err(SentinelError::Closed);
        }
        Ok(())
    }

    /// 停止并移除会话, 不存在时无操作
    ///
    /// # 返回
    /// 是否确实停止了一路会话
    pub fn stop_stream(&self, camera_id: u64) -> bool {
        let op = self.op_lock(camera_id);
        let guard = op.lock().unwrap_or_else(PoisonError::into_inner);

        let removed = self.sessions().remove(&camera_id);
        let stopped = match removed {
            Some(mut handle) => {
                handle.stop_and_join();
                info!("🛑 摄像头 {} 已移除", camera_id);
                true
            }
            None => false,
        };

        drop(guard);
        self.release_op_lock(camera_id, op);
        stopped
    }

    /// 最新已发布帧 (JPEG), 不等待会话
    pub fn get_latest_frame(&self, camera_id: u64) -> Option<Arc<Vec<u8>>> {
        self.sessions().get(&camera_id).and_then(SessionHandle::latest_frame)
    }

    /// 帧缓冲 (供需要 `wait_newer` 的投递层使用)
    pub fn frame_slot(&self, camera_id: u64) -> Option<Arc<FrameSlot>> {
        self.sessions().get(&camera_id).map(|h| h.slot().clone())
    }

    pub fn state(&self, camera_id: u64) -> Option<ConnectionState> {
        self.sessions().get(&camera_id).map(SessionHandle::state)
    }

    /// 活动会话的摄像头ID (升序)
    pub fn camera_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.sessions().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按摄像头记录同步会话: 启用则启动/替换, 停用则停止
    pub fn apply_camera(&self, camera: &Camera) -> Result<()> {
        if camera.is_active {
            self.add_or_replace_stream(camera.id, &camera.rtsp_url, camera.zone_config.as_deref())
        } else {
            self.stop_stream(camera.id);
            Ok(())
        }
    }

    /// 停止所有会话并等待退出, 之后拒绝新的会话
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);

        let drained: Vec<SessionHandle> = self.sessions().drain().map(|(_, h)| h).collect();
        if drained.is_empty() {
            return;
        }
        info!("🛑 正在停止 {} 路会话...", drained.len());

        // 先全部发出停止请求, 再逐一等待
        for handle in &drained {
            handle.request_stop();
        }
        for mut handle in drained {
            handle.stop_and_join();
        }
        info!("✅ 所有会话已停止");
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::RgbImage;

    use super::*;
    use crate::detection::Detection;
    use crate::sink::CameraStatus;
    use crate::stream::Capture;
    use crate::zones::AlertEvent;

    /// 视频源始终打不开, 其余协作者无操作
    struct Offline;

    impl Detector for Offline {
        fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    impl FrameSource for Offline {
        fn open(&self, _url: &str) -> Result<Box<dyn Capture>> {
            Err(SentinelError::Capture("unreachable".to_string()))
        }
    }

    impl EventSink for Offline {
        fn save(&self, _alert: &AlertEvent, _snapshot_jpeg: &[u8]) -> Result<u64> {
            Ok(0)
        }
    }

    impl StatusSink for Offline {
        fn set_status(&self, _camera_id: u64, _status: CameraStatus) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> StreamRegistry {
        let mut config = PipelineConfig::default();
        config.session.reconnect_backoff = Duration::from_millis(20);
        let deps = Arc::new(Offline);
        StreamRegistry::new(deps.clone(), deps.clone(), deps.clone(), deps, config)
    }

    #[test]
    fn test_stop_releases_op_lock() {
        let registry = registry();
        registry.add_or_replace_stream(1, "rtsp://cam1", None).unwrap();
        registry.add_or_replace_stream(2, "rtsp://cam2", None).unwrap();
        assert_eq!(registry.op_lock_count(), 2);

        assert!(registry.stop_stream(1));
        assert_eq!(registry.op_lock_count(), 1);

        // 未知摄像头不留下操作锁
        for id in 100..110 {
            assert!(!registry.stop_stream(id));
        }
        assert_eq!(registry.op_lock_count(), 1);

        // 再次启动同一摄像头仍然可用
        registry.add_or_replace_stream(1, "rtsp://cam1", None).unwrap();
        assert_eq!(registry.camera_ids(), vec![1, 2]);
        registry.shutdown();
        assert!(registry.is_empty());
    }
}
