//! 区域定义与解析 (Zone definition)
//!
//! 配置格式 (JSON):
//! ```json
//! [{"name": "Door", "points": [[0,0],[100,0],[100,100]], "triggers": ["intrusion", "loitering"]}]
//! ```
//! `triggers` 缺省为 `["intrusion"]`。

use log::warn;
use serde::Deserialize;

use crate::detection::types::Point;
use crate::{Result, SentinelError};

/// 区域触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Intrusion,
    Loitering,
}

impl Trigger {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "intrusion" => Some(Trigger::Intrusion),
            "loitering" => Some(Trigger::Loitering),
            _ => None,
        }
    }
}

/// 监控区域 (会话生命周期内不可变)
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: String,
    pub polygon: Vec<Point>,
    pub triggers: Vec<Trigger>,
}

#[derive(Deserialize)]
struct RawZone {
    #[serde(default = "default_zone_name")]
    name: String,
    points: Vec<[f32; 2]>,
    triggers: Option<Vec<String>>,
}

fn default_zone_name() -> String {
    "Zone".to_string()
}

impl Zone {
    pub fn new(name: impl Into<String>, polygon: Vec<Point>, triggers: Vec<Trigger>) -> Self {
        Self {
            name: name.into(),
            polygon,
            triggers,
        }
    }

    pub fn has_trigger(&self, trigger: Trigger) -> bool {
        self.triggers.contains(&trigger)
    }

    /// 解析区域配置, 格式错误时返回错误
    ///
    /// 单个区域顶点少于3个时丢弃该区域; 未知触发类型忽略。
    pub fn parse_config(json: &str) -> Result<Vec<Zone>> {
        let raw: Vec<RawZone> =
            serde_json::from_str(json).map_err(|e| SentinelError::ZoneConfig(e.to_string()))?;

        let mut zones = Vec::with_capacity(raw.len());
        for rz in raw {
            if rz.points.len() < 3 {
                warn!("⚠️ 区域 '{}' 顶点不足3个, 已忽略", rz.name);
                continue;
            }

            let triggers = match rz.triggers {
                None => vec![Trigger::Intrusion],
                Some(list) => {
                    let mut triggers = Vec::new();
                    for t in &list {
                        match Trigger::parse(t) {
                            Some(trigger) if !triggers.contains(&trigger) => triggers.push(trigger),
                            Some(_) => {}
                            None => warn!("⚠️ 区域 '{}' 未知触发类型 '{}'", rz.name, t),
                        }
                    }
                    triggers
                }
            };

            let polygon = rz.points.iter().map(|[x, y]| Point::new(*x, *y)).collect();
            zones.push(Zone::new(rz.name, polygon, triggers));
        }
        Ok(zones)
    }

    /// 宽松解析: 缺省或格式错误均视为没有区域
    pub fn parse_or_empty(camera_id: u64, json: Option<&str>) -> Vec<Zone> {
        let Some(json) = json.map(str::trim).filter(|s| !s.is_empty()) else {
            return Vec::new();
        };
        match Self::parse_config(json) {
            Ok(zones) => zones,
            Err(e) => {
                warn!("⚠️ 摄像头 {} 区域配置无效, 按无区域处理: {}", camera_id, e);
                Vec::new()
            }
        }
    }

    /// 点是否在多边形内 (边界算在内)
    pub fn contains(&self, p: Point) -> bool {
        point_in_polygon(p, &self.polygon)
    }
}

/// 射线法判断点是否在多边形内, 点落在边上返回 true
pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if on_segment(p, a, b) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    const EPS: f32 = 1e-3;
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EPS * ((b.x - a.x).abs() + (b.y - a.y).abs()).max(1.0) {
        return false;
    }
    p.x >= a.x.min(b.x) - EPS
        && p.x <= a.x.max(b.x) + EPS
        && p.y >= a.y.min(b.y) - EPS
        && p.y <= a.y.max(b.y) + EPS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Zone {
        Zone::new(
            "Square",
            vec![
                Point::new(0.0, 0.0),
                Point::new(100.0, 0.0),
                Point::new(100.0, 100.0),
                Point::new(0.0, 100.0),
            ],
            vec![Trigger::Intrusion],
        )
    }

    #[test]
    fn test_contains() {
        let zone = square();
        assert!(zone.contains(Point::new(50.0, 50.0)));
        assert!(!zone.contains(Point::new(150.0, 50.0)));
        assert!(!zone.contains(Point::new(-1.0, 50.0)));
    }

    #[test]
    fn test_boundary_is_inside() {
        let zone = square();
        assert!(zone.contains(Point::new(0.0, 50.0)));
        assert!(zone.contains(Point::new(100.0, 100.0)));
        assert!(zone.contains(Point::new(50.0, 0.0)));
        assert!(zone.contains(Point::new(100.0, 30.0)));
    }

    #[test]
    fn test_concave_polygon() {
        // U 形
        let u = vec![
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            Point::new(30.0, 60.0),
            Point::new(60.0, 60.0),
            Point::new(60.0, 0.0),
            Point::new(90.0, 0.0),
            Point::new(90.0, 90.0),
            Point::new(0.0, 90.0),
        ];
        assert!(point_in_polygon(Point::new(15.0, 30.0), &u));
        assert!(!point_in_polygon(Point::new(45.0, 30.0), &u));
        assert!(point_in_polygon(Point::new(45.0, 75.0), &u));
    }

    #[test]
    fn test_parse_defaults() {
        let zones = Zone::parse_config(r#"[{"name": "Door", "points": [[0,0],[10,0],[10,10]]}]"#)
            .unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "Door");
        assert_eq!(zones[0].triggers, vec![Trigger::Intrusion]);
    }

    #[test]
    fn test_parse_triggers_and_default_name() {
        let zones = Zone::parse_config(
            r#"[{"points": [[0,0],[10,0],[10,10]], "triggers": ["loitering", "Intrusion", "fire"]}]"#,
        )
        .unwrap();
        assert_eq!(zones[0].name, "Zone");
        assert_eq!(zones[0].triggers, vec![Trigger::Loitering, Trigger::Intrusion]);
    }

    #[test]
    fn test_parse_drops_degenerate_zone() {
        let zones = Zone::parse_config(
            r#"[{"name": "Line", "points": [[0,0],[10,0]]}, {"name": "Ok", "points": [[0,0],[10,0],[0,10]]}]"#,
        )
        .unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "Ok");
    }

    #[test]
    fn test_malformed_is_empty() {
        assert!(Zone::parse_config("not json").is_err());
        assert!(Zone::parse_or_empty(1, Some("not json")).is_empty());
        assert!(Zone::parse_or_empty(1, Some(r#"{"name": "x"}"#)).is_empty());
        assert!(Zone::parse_or_empty(1, Some("  ")).is_empty());
        assert!(Zone::parse_or_empty(1, None).is_empty());
    }
}
