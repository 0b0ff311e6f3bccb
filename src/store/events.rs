//! 事件存储 (Event store)
//!
//! - 快照: `<dir>/event_<摄像头ID>_<毫秒时间戳>[_<n>].jpg`
//! - 记录: `<dir>/events.jsonl`, 每行一条 JSON, 只追加
//!
//! 事件ID严格递增, 重新打开后从已有最大ID之后继续。

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::sink::EventSink;
use crate::zones::AlertEvent;
use crate::Result;

/// 默认查询条数
pub const DEFAULT_LIMIT: usize = 50;

const LOG_FILE: &str = "events.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub camera_id: u64,
    pub timestamp: DateTime<Utc>,
    pub rule_name: String,
    pub object_type: String,
    pub confidence: f32,
    pub snapshot_path: PathBuf,
}

struct EventLog {
    next_id: u64,
    records: Vec<EventRecord>,
}

pub struct FileEventStore {
    dir: PathBuf,
    log: Mutex<EventLog>,
}

impl FileEventStore {
    /// 打开存储目录 (不存在则创建), 加载已有记录
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut records = Vec::new();
        let log_path = dir.join(LOG_FILE);
        if log_path.exists() {
            let reader = BufReader::new(fs::File::open(&log_path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<EventRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("⚠️ 事件日志第 {} 行无效, 已跳过: {}", lineno + 1, e),
                }
            }
        }

        let next_id = records.iter().map(|r| r.id).max().map_or(1, |id| id + 1);
        info!("✅ 事件存储: {} ({} 条)", dir.display(), records.len());

        Ok(Self {
            dir,
            log: Mutex::new(EventLog { next_id, records }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, EventLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u64) -> Option<EventRecord> {
        self.lock().records.iter().find(|r| r.id == id).cloned()
    }

    /// 查询事件, 时间倒序
    ///
    /// # 参数
    /// - `camera_id`: 按摄像头过滤
    /// - `rule_name`: 按规则名过滤 (完全匹配)
    /// - `limit`: 最多返回条数
    pub fn list(
        &self,
        camera_id: Option<u64>,
        rule_name: Option<&str>,
        limit: usize,
    ) -> Vec<EventRecord> {
        let log = self.lock();
        let mut matched: Vec<&EventRecord> = log
            .records
            .iter()
            .filter(|r| camera_id.map_or(true, |id| r.camera_id == id))
            .filter(|r| rule_name.map_or(true, |name| r.rule_name == name))
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        matched.into_iter().take(limit).cloned().collect()
    }

    /// 同一毫秒内多条告警时追加序号避免覆盖
    fn snapshot_path(&self, camera_id: u64, millis: i64) -> PathBuf {
        let base = format!("event_{}_{}", camera_id, millis);
        let mut path = self.dir.join(format!("{}.jpg", base));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.jpg", base, n));
            n += 1;
        }
        path
    }
}

impl EventSink for FileEventStore {
    fn save(&self, alert: &AlertEvent, snapshot_jpeg: &[u8]) -> Result<u64> {
        let mut log = self.lock();

        let snapshot_path = self.snapshot_path(alert.camera_id, alert.timestamp.timestamp_millis());
        fs::write(&snapshot_path, snapshot_jpeg)?;

        let record = EventRecord {
            id: log.next_id,
            camera_id: alert.camera_id,
            timestamp: alert.timestamp,
            rule_name: alert.rule_name.clone(),
            object_type: alert.object_type.clone(),
            confidence: alert.confidence,
            snapshot_path,
        };

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(LOG_FILE))?;
        file.write_all(line.as_bytes())?;

        let id = record.id;
        log.next_id += 1;
        log.records.push(record);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use crate::zones::EventType;
    use chrono::Duration;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "sentinel-events-{}-{}-{}",
            tag,
            std::process::id(),
            nanos
        ))
    }

    fn alert(camera_id: u64, event_type: EventType, timestamp: DateTime<Utc>) -> AlertEvent {
        AlertEvent {
            camera_id,
            object_id: 0,
            zone: "Door".to_string(),
            event_type,
            rule_name: format!("{}: Door", event_type),
            object_type: "person".to_string(),
            confidence: 0.9,
            timestamp,
            bbox: BBox::new(0.0, 0.0, 10.0, 20.0),
        }
    }

    #[test]
    fn test_save_writes_snapshot_and_record() {
        let dir = temp_dir("save");
        let store = FileEventStore::open(&dir).unwrap();
        assert_eq!(store.dir(), dir.as_path());
        let t0 = Utc::now();

        let id = store.save(&alert(3, EventType::Intrusion, t0), b"jpeg-bytes").unwrap();
        assert_eq!(id, 1);

        let record = store.get(id).unwrap();
        assert_eq!(record.rule_name, "Intrusion: Door");
        assert_eq!(record.object_type, "person");
        let name = record.snapshot_path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, format!("event_3_{}.jpg", t0.timestamp_millis()));
        assert_eq!(fs::read(&record.snapshot_path).unwrap(), b"jpeg-bytes");

        // 同一毫秒第二条告警不覆盖快照
        let id2 = store.save(&alert(3, EventType::Loitering, t0), b"other").unwrap();
        let second = store.get(id2).unwrap();
        assert_ne!(second.snapshot_path, record.snapshot_path);
        assert_eq!(fs::read(&record.snapshot_path).unwrap(), b"jpeg-bytes");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_ids_continue_after_reopen() {
        let dir = temp_dir("reopen");
        {
            let store = FileEventStore::open(&dir).unwrap();
            let t0 = Utc::now();
            store.save(&alert(1, EventType::Intrusion, t0), b"a").unwrap();
            store.save(&alert(1, EventType::Intrusion, t0 + Duration::seconds(1)), b"b").unwrap();
        }
        let store = FileEventStore::open(&dir).unwrap();
        assert_eq!(store.len(), 2);
        let id = store.save(&alert(1, EventType::Intrusion, Utc::now()), b"c").unwrap();
        assert_eq!(id, 3);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_list_filters_newest_first() {
        let dir = temp_dir("list");
        let store = FileEventStore::open(&dir).unwrap();
        let t0 = Utc::now();
        for i in 0..5 {
            let camera_id = if i % 2 == 0 { 1 } else { 2 };
            store
                .save(&alert(camera_id, EventType::Intrusion, t0 + Duration::seconds(i)), b"x")
                .unwrap();
        }
        store
            .save(&alert(1, EventType::Loitering, t0 + Duration::seconds(10)), b"x")
            .unwrap();

        let all = store.list(None, None, DEFAULT_LIMIT);
        assert_eq!(all.len(), 6);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        let cam1: Vec<u64> = store
            .list(Some(1), None, DEFAULT_LIMIT)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(cam1, vec![6, 5, 3, 1]);

        let loitering = store.list(None, Some("Loitering: Door"), DEFAULT_LIMIT);
        assert_eq!(loitering.len(), 1);
        assert_eq!(loitering[0].id, 6);

        assert_eq!(store.list(None, None, 2).len(), 2);
        assert!(store.get(42).is_none());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_skips_corrupt_lines() {
        let dir = temp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(LOG_FILE), "not json\n\n").unwrap();
        let store = FileEventStore::open(&dir).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.save(&alert(1, EventType::Intrusion, Utc::now()), b"x").unwrap(), 1);

        fs::remove_dir_all(&dir).ok();
    }
}
