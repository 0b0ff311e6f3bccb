//! 摄像头登记表 (Camera registry)
//!
//! JSON 数组文件, 整表读写。会话通过 `StatusSink` 回写在线状态。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::sink::{CameraStatus, StatusSink};
use crate::{Result, SentinelError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: u64,
    pub name: String,
    pub rtsp_url: String,
    #[serde(default)]
    pub location: Option<String>,
    /// 所属站点
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "default_status")]
    pub status: CameraStatus,
    /// 区域配置 (JSON字符串, 见 `Zone::parse_config`)
    #[serde(default)]
    pub zone_config: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

fn default_status() -> CameraStatus {
    CameraStatus::Offline
}

impl Camera {
    pub fn new(id: u64, name: impl Into<String>, rtsp_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            rtsp_url: rtsp_url.into(),
            location: None,
            site: None,
            is_active: true,
            status: CameraStatus::Offline,
            zone_config: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_zones(mut self, zone_config: impl Into<String>) -> Self {
        self.zone_config = Some(zone_config.into());
        self
    }
}

pub struct CameraStore {
    path: PathBuf,
    cameras: Mutex<BTreeMap<u64, Camera>>,
}

impl CameraStore {
    /// 打开登记表, 文件不存在时视为空表
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cameras = read_file(&path)?;
        info!("✅ 摄像头登记表: {} ({} 路)", path.display(), cameras.len());
        Ok(Self {
            path,
            cameras: Mutex::new(cameras),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Camera>> {
        self.cameras.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 重新读取文件 (外部编辑后)
    pub fn load(&self) -> Result<Vec<Camera>> {
        let cameras = read_file(&self.path)?;
        let list = cameras.values().cloned().collect();
        *self.lock() = cameras;
        Ok(list)
    }

    pub fn get(&self, id: u64) -> Option<Camera> {
        self.lock().get(&id).cloned()
    }

    /// 全部摄像头 (按ID升序)
    pub fn list(&self) -> Vec<Camera> {
        self.lock().values().cloned().collect()
    }

    /// 启用的摄像头
    pub fn active(&self) -> Vec<Camera> {
        self.lock().values().filter(|c| c.is_active).cloned().collect()
    }

    /// 下一个可用ID
    pub fn next_id(&self) -> u64 {
        self.lock().keys().next_back().map_or(1, |id| id + 1)
    }

    /// 新增或更新, 名称须唯一
    pub fn upsert(&self, camera: Camera) -> Result<()> {
        let mut cameras = self.lock();
        if let Some(other) = cameras
            .values()
            .find(|c| c.id != camera.id && c.name == camera.name)
        {
            return Err(SentinelError::Store(format!(
                "摄像头名称 '{}' 已被 #{} 使用",
                camera.name, other.id
            )));
        }
        cameras.insert(camera.id, camera);
        write_file(&self.path, &cameras)
    }

    pub fn remove(&self, id: u64) -> Result<Option<Camera>> {
        let mut cameras = self.lock();
        let removed = cameras.remove(&id);
        if removed.is_some() {
            write_file(&self.path, &cameras)?;
        }
        Ok(removed)
    }

    pub fn set_status(&self, id: u64, status: CameraStatus) -> Result<()> {
        let mut cameras = self.lock();
        let camera = cameras
            .get_mut(&id)
            .ok_or_else(|| SentinelError::NotFound(format!("摄像头 #{}", id)))?;
        if camera.status == status {
            return Ok(());
        }
        camera.status = status;
        debug!("摄像头 {} 状态写入: {}", id, status);
        write_file(&self.path, &cameras)
    }
}

impl StatusSink for CameraStore {
    fn set_status(&self, camera_id: u64, status: CameraStatus) -> Result<()> {
        CameraStore::set_status(self, camera_id, status)
    }
}

fn read_file(path: &Path) -> Result<BTreeMap<u64, Camera>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let bytes = fs::read(path)?;
    let list: Vec<Camera> = serde_json::from_slice(&bytes)?;
    Ok(list.into_iter().map(|c| (c.id, c)).collect())
}

/// 先写临时文件再改名, 读者不会看到半截文件
fn write_file(path: &Path, cameras: &BTreeMap<u64, Camera>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let list: Vec<&Camera> = cameras.values().collect();
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(&list)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
