/// 区域规则系统 (Zone rules)
///
/// - Zone:           多边形区域 + 触发类型, 会话启动时解析一次
/// - ZoneRuleEngine: 停留时间判定 + 告警去重 (每路摄像头独立实例)
pub mod rules;
pub mod zone;

pub use rules::{AlertEvent, DedupKey, EventType, ZoneRuleEngine};
pub use zone::{point_in_polygon, Trigger, Zone};
