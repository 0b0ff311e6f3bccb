//! 区域规则引擎 (Zone rule engine)
//!
//! 每帧对 (跟踪对象 × 区域) 评估停留时间:
//! - 进入区域: 记录进入时间 (已存在则保留)
//! - 离开区域: 清除进入时间
//! - 区域内: 停留 < 入侵窗口 → 入侵; 否则停留 > 徘徊阈值 → 徘徊; 两者之间不告警
//!
//! 告警按 (摄像头, 目标, 区域, 类型) 去重, 冷却期内只发一次。
//! 停留与冷却按单调时钟计算, 墙钟只用于告警时间戳。

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use super::zone::{Trigger, Zone};
use crate::config::RuleConfig;
use crate::detection::tracker::TrackedObject;
use crate::detection::types::{BBox, PERSON};

/// 告警类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Intrusion,
    Loitering,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Intrusion => write!(f, "Intrusion"),
            EventType::Loitering => write!(f, "Loitering"),
        }
    }
}

/// 去重键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub camera_id: u64,
    pub object_id: u64,
    pub zone: String,
    pub event_type: EventType,
}

/// 区域告警 (规则引擎 → 事件存储)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub camera_id: u64,
    pub object_id: u64,
    pub zone: String,
    pub event_type: EventType,
    /// "<类型>: <区域名>"
    pub rule_name: String,
    pub object_type: String,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub bbox: BBox,
}

pub struct ZoneRuleEngine {
    camera_id: u64,
    zones: Vec<Zone>,
    config: RuleConfig,
    last_emitted: HashMap<DedupKey, Instant>,
}

impl ZoneRuleEngine {
    pub fn new(camera_id: u64, zones: Vec<Zone>, config: RuleConfig) -> Self {
        Self {
            camera_id,
            zones,
            config,
            last_emitted: HashMap::new(),
        }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// 去重表大小
    pub fn dedup_len(&self) -> usize {
        self.last_emitted.len()
    }

    /// 评估当前帧
    ///
    /// # 参数
    /// - `objects`: 当前存活的跟踪对象 (进入时间就地更新)
    /// - `now`: 单调时钟当前时刻
    /// - `timestamp`: 告警时间戳
    pub fn evaluate<'a, I>(
        &mut self,
        objects: I,
        now: Instant,
        timestamp: DateTime<Utc>,
    ) -> Vec<AlertEvent>
    where
        I: IntoIterator<Item = &'a mut TrackedObject>,
    {
        let mut alerts = Vec::new();

        for obj in objects {
            for zone in &self.zones {
                if !zone.contains(obj.centroid) {
                    obj.zone_entries.remove(&zone.name);
                    continue;
                }

                let entered = *obj.zone_entries.entry(zone.name.clone()).or_insert(now);
                let dwell = now.saturating_duration_since(entered);

                let event_type = if zone.has_trigger(Trigger::Intrusion)
                    && dwell < self.config.intrusion_window
                {
                    EventType::Intrusion
                } else if zone.has_trigger(Trigger::Loitering)
                    && dwell > self.config.loitering_threshold
                {
                    EventType::Loitering
                } else {
                    continue;
                };

                let key = DedupKey {
                    camera_id: self.camera_id,
                    object_id: obj.id,
                    zone: zone.name.clone(),
                    event_type,
                };
                if let Some(last) = self.last_emitted.get(&key) {
                    if now.saturating_duration_since(*last) <= self.config.cooldown {
                        continue;
                    }
                }
                self.last_emitted.insert(key, now);

                debug!(
                    "🚨 摄像头 {} 目标 #{} {}: {} (停留 {:.1}s)",
                    self.camera_id,
                    obj.id,
                    event_type,
                    zone.name,
                    dwell.as_secs_f32()
                );
                alerts.push(AlertEvent {
                    camera_id: self.camera_id,
                    object_id: obj.id,
                    zone: zone.name.clone(),
                    event_type,
                    rule_name: format!("{}: {}", event_type, zone.name),
                    object_type: PERSON.to_string(),
                    confidence: self.config.alert_confidence,
                    timestamp,
                    bbox: obj.bbox,
                });
            }
        }

        if let Some(ttl) = self.config.dedup_ttl {
            self.sweep(now, ttl);
        }

        alerts
    }

    /// 清理过期去重项
    fn sweep(&mut self, now: Instant, ttl: Duration) {
        self.last_emitted
            .retain(|_, last| now.saturating_duration_since(*last) <= ttl);
    }
}
