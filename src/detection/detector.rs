//! 检测器接口 (Detector capability)
//!
//! 一个检测器实例由所有会话共享 (Arc<dyn Detector>)。
//! 实现必须满足以下之一:
//! - 内部线程安全, 可被多个会话并发调用;
//! - 内部串行化调用 (例如 `Mutex` 包裹模型, 见 `YoloDetector`)。
//!
//! 每个会话每处理一帧只调用一次 `detect`。

use image::RgbImage;

use super::types::{BBox, Detection};
use crate::Result;

/// 目标检测能力
pub trait Detector: Send + Sync {
    /// 检测单帧
    ///
    /// # 参数
    /// - `frame`: RGB帧 (宽 × 高 × 3)
    ///
    /// # 返回
    /// 检测结果列表, 坐标为输入帧的像素坐标
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>>;

    /// 检测器名称 (日志用)
    fn name(&self) -> &str {
        "detector"
    }
}

/// 按类别过滤, 返回关注类别的检测框
pub fn filter_classes(detections: &[Detection], classes: &[String]) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| classes.iter().any(|c| d.is(c)))
        .cloned()
        .collect()
}

/// 非极大值抑制 (按置信度降序, 同类别内抑制)
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].label != xs[index].label {
                continue;
            }
            if compute_iou(&xs[prev_index].bbox, &xs[index].bbox) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = bbox1.area() + bbox2.area() - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

/// 根据ID生成不同颜色
pub fn id_to_color(id: u64) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::PERSON;

    #[test]
    fn test_filter_classes() {
        let dets = vec![
            Detection::person(BBox::new(0.0, 0.0, 10.0, 10.0), 0.8),
            Detection::new(BBox::new(0.0, 0.0, 10.0, 10.0), "car", 0.9),
        ];
        let people = filter_classes(&dets, &[PERSON.to_string()]);
        assert_eq!(people.len(), 1);
        assert!(people[0].is(PERSON));
    }

    #[test]
    fn test_iou() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((compute_iou(&a, &b) - 1.0 / 3.0).abs() < 1e-5);
        assert_eq!(compute_iou(&a, &BBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_per_class() {
        let mut dets = vec![
            Detection::person(BBox::new(0.0, 0.0, 10.0, 10.0), 0.6),
            Detection::person(BBox::new(1.0, 1.0, 11.0, 11.0), 0.9),
            Detection::new(BBox::new(1.0, 1.0, 11.0, 11.0), "dog", 0.5),
            Detection::person(BBox::new(50.0, 50.0, 60.0, 60.0), 0.7),
        ];
        non_max_suppression(&mut dets, 0.45);
        assert_eq!(dets.len(), 3);
        assert_eq!(dets[0].confidence, 0.9);
        assert!(dets.iter().any(|d| d.is("dog")));
    }

    #[test]
    fn test_colors_differ() {
        assert_ne!(id_to_color(1), id_to_color(2));
    }
}
