//! 质心跟踪器 (Centroid tracker)
//!
//! 以检测框脚点作为关联点, 贪心最近邻匹配:
//! 1. 计算 (已有目标, 新检测) 全部两两距离
//! 2. 按距离升序遍历, 双方均未被占用且距离 ≤ 阈值则绑定
//! 3. 未匹配目标丢失计数+1, 超过阈值注销; 未匹配检测注册为新目标
//!
//! 不是最小代价二分匹配。距离相同时按 (目标ID, 检测序号) 顺序决胜, 结果可复现。
//! 每路摄像头持有独立实例, ID空间互不相交。

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use super::types::{BBox, Point};
use crate::config::TrackerConfig;

/// 跟踪对象
#[derive(Clone, Debug)]
pub struct TrackedObject {
    /// 唯一跟踪ID (单调递增, 不复用)
    pub id: u64,

    /// 最近一次关联点 (脚点)
    pub centroid: Point,

    /// 最近一次匹配的检测框
    pub bbox: BBox,

    /// 连续丢失帧数
    pub frames_since_seen: u32,

    /// 区域进入时刻 (单调时钟): 区域名 → 时刻
    pub zone_entries: HashMap<String, Instant>,
}

impl TrackedObject {
    fn new(id: u64, bbox: BBox) -> Self {
        Self {
            id,
            centroid: bbox.foot_point(),
            bbox,
            frames_since_seen: 0,
            zone_entries: HashMap::new(),
        }
    }

    /// 本帧是否被检测到
    pub fn is_visible(&self) -> bool {
        self.frames_since_seen == 0
    }
}

pub struct CentroidTracker {
    objects: BTreeMap<u64, TrackedObject>,
    next_id: u64,
    config: TrackerConfig,
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl CentroidTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 0,
            config,
        }
    }

    /// 更新跟踪器
    ///
    /// # 参数
    /// - `boxes`: 当前帧检测框 (无序)
    ///
    /// # 返回
    /// 当前所有存活的跟踪对象 (按ID升序)
    pub fn update(&mut self, boxes: &[BBox]) -> Vec<&TrackedObject> {
        if boxes.is_empty() {
            let ids: Vec<u64> = self.objects.keys().copied().collect();
            for id in ids {
                self.mark_missing(id);
            }
            return self.objects.values().collect();
        }

        if self.objects.is_empty() {
            for bbox in boxes {
                self.register(*bbox);
            }
            return self.objects.values().collect();
        }

        let points: Vec<Point> = boxes.iter().map(BBox::foot_point).collect();
        let ids: Vec<u64> = self.objects.keys().copied().collect();

        // 全部 (目标, 检测) 对, 稳定排序保证平局时按目标序号决胜
        let mut pairs = Vec::with_capacity(ids.len() * points.len());
        for (row, id) in ids.iter().enumerate() {
            let centroid = self.objects[id].centroid;
            for (col, point) in points.iter().enumerate() {
                pairs.push((row, col, centroid.distance(point)));
            }
        }
        pairs.sort_by(|a, b| a.2.total_cmp(&b.2));

        let mut used_rows = vec![false; ids.len()];
        let mut used_cols = vec![false; points.len()];

        for (row, col, distance) in pairs {
            if used_rows[row] || used_cols[col] {
                continue;
            }
            // 跳变过大, 不视为同一目标
            if distance > self.config.max_association_distance {
                continue;
            }

            if let Some(obj) = self.objects.get_mut(&ids[row]) {
                obj.centroid = points[col];
                obj.bbox = boxes[col];
                obj.frames_since_seen = 0;
            }
            used_rows[row] = true;
            used_cols[col] = true;
        }

        for (row, id) in ids.iter().enumerate() {
            if !used_rows[row] {
                self.mark_missing(*id);
            }
        }

        for (col, bbox) in boxes.iter().enumerate() {
            if !used_cols[col] {
                self.register(*bbox);
            }
        }

        self.objects.values().collect()
    }

    fn register(&mut self, bbox: BBox) {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, TrackedObject::new(id, bbox));
    }

    fn mark_missing(&mut self, id: u64) {
        let expired = match self.objects.get_mut(&id) {
            Some(obj) => {
                obj.frames_since_seen += 1;
                obj.frames_since_seen > self.config.max_disappeared
            }
            None => false,
        };
        if expired {
            // 注销同时丢弃区域计时
            self.objects.remove(&id);
        }
    }

    pub fn get(&self, id: u64) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut TrackedObject> {
        self.objects.values_mut()
    }

    /// 获取当前跟踪数量
    pub fn track_count(&self) -> usize {
        self.objects.len()
    }

    /// 下一个将分配的ID
    pub fn next_id(&self) -> u64 {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 以脚点构造检测框
    fn foot(x: f32, y: f32) -> BBox {
        BBox::new(x - 10.0, y - 40.0, x + 10.0, y)
    }

    fn positions(tracker: &CentroidTracker) -> Vec<(u64, Point)> {
        tracker.objects().map(|o| (o.id, o.centroid)).collect()
    }

    #[test]
    fn test_register_all_when_empty() {
        let mut tracker = CentroidTracker::default();
        let objs = tracker.update(&[foot(10.0, 10.0), foot(300.0, 300.0)]);
        let ids: Vec<u64> = objs.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_uses_foot_point() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[BBox::new(0.0, 0.0, 20.0, 100.0)]);
        assert_eq!(tracker.get(0).unwrap().centroid, Point::new(10.0, 100.0));
    }

    #[test]
    fn test_greedy_nearest_pairing() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[foot(0.0, 0.0), foot(100.0, 100.0)]);

        // 新检测顺序与目标顺序相反
        tracker.update(&[foot(95.0, 95.0), foot(5.0, 5.0)]);

        assert_eq!(
            positions(&tracker),
            vec![(0, Point::new(5.0, 5.0)), (1, Point::new(95.0, 95.0))]
        );
        assert_eq!(tracker.next_id(), 2);
    }

    #[test]
    fn test_global_nearest_beats_index_order() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[foot(0.0, 0.0), foot(50.0, 0.0)]);

        // (45,0)↔目标1 距离最短, 先绑定; 目标0 拿到 (20,0)
        tracker.update(&[foot(45.0, 0.0), foot(20.0, 0.0)]);

        assert_eq!(tracker.get(0).unwrap().centroid, Point::new(20.0, 0.0));
        assert_eq!(tracker.get(1).unwrap().centroid, Point::new(45.0, 0.0));
    }

    #[test]
    fn test_tie_broken_by_object_order() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[foot(0.0, 0.0), foot(20.0, 0.0)]);

        // 新点到两个目标距离相同, 应归属目标0
        tracker.update(&[foot(10.0, 0.0)]);

        assert_eq!(tracker.get(0).unwrap().frames_since_seen, 0);
        assert_eq!(tracker.get(0).unwrap().centroid, Point::new(10.0, 0.0));
        assert_eq!(tracker.get(1).unwrap().frames_since_seen, 1);
    }

    #[test]
    fn test_distance_threshold_registers_new() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[foot(0.0, 0.0)]);
        tracker.update(&[foot(0.0, 150.0)]);

        assert_eq!(tracker.track_count(), 2);
        assert_eq!(tracker.get(0).unwrap().frames_since_seen, 1);
        assert_eq!(tracker.get(1).unwrap().centroid, Point::new(0.0, 150.0));
    }

    #[test]
    fn test_exact_threshold_matches() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[foot(0.0, 0.0)]);
        tracker.update(&[foot(0.0, 100.0)]);
        assert_eq!(tracker.track_count(), 1);
        assert_eq!(tracker.get(0).unwrap().centroid, Point::new(0.0, 100.0));
    }

    #[test]
    fn test_deregister_after_six_missed_frames() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[foot(10.0, 10.0)]);

        for frame in 1..=5 {
            tracker.update(&[]);
            assert_eq!(tracker.get(0).map(|o| o.frames_since_seen), Some(frame));
        }

        tracker.update(&[]);
        assert!(tracker.get(0).is_none());
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn test_missed_with_other_detections() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[foot(10.0, 10.0)]);

        for _ in 0..6 {
            tracker.update(&[foot(500.0, 400.0)]);
        }

        assert!(tracker.get(0).is_none());
        assert_eq!(tracker.get(1).unwrap().frames_since_seen, 0);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut tracker = CentroidTracker::new(TrackerConfig {
            max_disappeared: 0,
            ..TrackerConfig::default()
        });

        let mut seen = Vec::new();
        for i in 0..5 {
            // 每帧都远离上一帧, 旧目标立即注销
            let objs = tracker.update(&[foot(i as f32 * 200.0 % 600.0, (i * 150) as f32)]);
            seen.extend(objs.iter().map(|o| o.id));
        }

        let mut sorted = seen.clone();
        sorted.dedup();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_deregister_drops_zone_entries() {
        let mut tracker = CentroidTracker::new(TrackerConfig {
            max_disappeared: 0,
            ..TrackerConfig::default()
        });
        tracker.update(&[foot(10.0, 10.0)]);
        for obj in tracker.objects_mut() {
            obj.zone_entries.insert("Door".to_string(), Instant::now());
        }
        tracker.update(&[]);
        assert_eq!(tracker.track_count(), 0);

        tracker.update(&[foot(10.0, 10.0)]);
        let obj = tracker.get(1).unwrap();
        assert!(obj.zone_entries.is_empty());
    }
}
