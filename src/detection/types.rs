//! 检测系统数据结构定义
//! Data structures shared by detector, tracker and rule engine

use serde::{Deserialize, Serialize};

/// 人员类别标签
pub const PERSON: &str = "person";

/// 检测框 (像素坐标, 左上 + 右下)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// 中心点
    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 脚点: 水平中点 + 底边y
    ///
    /// 地面位置比框中心更稳定, 用于跟踪与区域判定
    pub fn foot_point(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, self.y2)
    }

    /// 按比例缩放 (模型坐标 → 帧坐标)
    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }

    /// 裁剪到图像范围
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        }
    }
}

/// 二维点
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 欧氏距离
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 单个检测结果 (检测器 → 会话)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub label: String,
    /// 置信度 [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BBox, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn person(bbox: BBox, confidence: f32) -> Self {
        Self::new(bbox, PERSON, confidence)
    }

    pub fn is(&self, label: &str) -> bool {
        self.label == label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foot_point() {
        let b = BBox::new(10.0, 20.0, 30.0, 100.0);
        assert_eq!(b.foot_point(), Point::new(20.0, 100.0));
        assert_eq!(b.center(), Point::new(20.0, 60.0));
    }

    #[test]
    fn test_degenerate_box() {
        let b = BBox::new(30.0, 30.0, 10.0, 10.0);
        assert_eq!(b.area(), 0.0);
    }

    #[test]
    fn test_confidence_clamped() {
        let d = Detection::person(BBox::default(), 1.7);
        assert_eq!(d.confidence, 1.0);
        assert!(d.is(PERSON));
    }
}
