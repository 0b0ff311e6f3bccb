//! 外部协作者接口 (External collaborators)
//!
//! - `EventSink`:  告警事件持久化 (分配ID与快照存储位置)
//! - `StatusSink`: 摄像头在线状态回写
//!
//! 两者失败时由会话记录日志, 从不中断会话循环。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::zones::AlertEvent;
use crate::Result;

/// 摄像头状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Online,
    Offline,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraStatus::Online => write!(f, "online"),
            CameraStatus::Offline => write!(f, "offline"),
        }
    }
}

/// 事件持久化
pub trait EventSink: Send + Sync {
    /// 保存单条告警及当前帧快照 (JPEG)
    ///
    /// # 返回
    /// 存储分配的事件ID
    fn save(&self, alert: &AlertEvent, snapshot_jpeg: &[u8]) -> Result<u64>;
}

/// 状态回写
pub trait StatusSink: Send + Sync {
    fn set_status(&self, camera_id: u64, status: CameraStatus) -> Result<()>;
}
