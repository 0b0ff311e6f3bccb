//! 帧标注 (Frame annotation)
//!
//! 在实时画面上叠加区域多边形和本帧原始检测框 (类别 + 置信度),
//! 跟踪中的人员再叠加按ID着色的框、脚点和ID标签。

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use log::warn;

use crate::detection::detector::id_to_color;
use crate::detection::{Detection, TrackedObject};
use crate::zones::Zone;

const ZONE_COLOR: Rgb<u8> = Rgb([255, 215, 0]);
const DETECTION_COLOR: Rgb<u8> = Rgb([200, 200, 200]);

pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    /// 字体加载失败时只画框, 不画文字
    pub fn new(font_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|path| match std::fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    warn!("⚠️ 字体解析失败 {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("⚠️ 字体读取失败 {}: {}", path.display(), e);
                None
            }
        });
        Self {
            font,
            scale: PxScale::from(16.0),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 绘制一帧叠加层
    ///
    /// # 参数
    /// - `detections`: 本帧检测结果 (全部类别)
    /// - `objects`: 跟踪对象, 画在检测框之上
    pub fn draw<'a, I>(
        &self,
        frame: &mut RgbImage,
        zones: &[Zone],
        detections: &[Detection],
        objects: I,
    ) where
        I: IntoIterator<Item = &'a TrackedObject>,
    {
        for zone in zones {
            self.draw_zone(frame, zone);
        }
        for det in detections {
            self.draw_detection(frame, det);
        }
        for obj in objects {
            // 丢失中的目标不画
            if obj.is_visible() {
                self.draw_object(frame, obj);
            }
        }
    }

    fn draw_zone(&self, frame: &mut RgbImage, zone: &Zone) {
        let n = zone.polygon.len();
        for i in 0..n {
            let (a, b) = (zone.polygon[i], zone.polygon[(i + 1) % n]);
            draw_line_segment_mut(frame, (a.x, a.y), (b.x, b.y), ZONE_COLOR);
        }
        if let (Some(font), Some(first)) = (&self.font, zone.polygon.first()) {
            draw_text_mut(
                frame,
                ZONE_COLOR,
                first.x as i32 + 2,
                first.y as i32 + 2,
                self.scale,
                font,
                &zone.name,
            );
        }
    }

    fn draw_detection(&self, frame: &mut RgbImage, det: &Detection) {
        let bbox = det.bbox;
        let w = (bbox.width() as u32).max(1);
        let h = (bbox.height() as u32).max(1);
        let rect = Rect::at(bbox.x1 as i32, bbox.y1 as i32).of_size(w, h);
        draw_hollow_rect_mut(frame, rect, DETECTION_COLOR);

        if let Some(font) = &self.font {
            let label = format!("{} {:.2}", det.label, det.confidence);
            let y = (bbox.y2 as i32 + 2).min(frame.height() as i32 - 1);
            draw_text_mut(frame, DETECTION_COLOR, bbox.x1 as i32, y, self.scale, font, &label);
        }
    }

    fn draw_object(&self, frame: &mut RgbImage, obj: &TrackedObject) {
        let (r, g, b) = id_to_color(obj.id);
        let color = Rgb([r, g, b]);

        let bbox = obj.bbox;
        let w = (bbox.width() as u32).max(1);
        let h = (bbox.height() as u32).max(1);
        let rect = Rect::at(bbox.x1 as i32, bbox.y1 as i32).of_size(w, h);
        draw_hollow_rect_mut(frame, rect, color);

        let foot = (obj.centroid.x as i32, obj.centroid.y as i32);
        draw_filled_circle_mut(frame, foot, 3, color);

        if let Some(font) = &self.font {
            let label = format!("#{}", obj.id);
            let y = (bbox.y1 as i32 - self.scale.y as i32).max(0);
            draw_text_mut(frame, color, bbox.x1 as i32, y, self.scale, font, &label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BBox, Point};
    use crate::detection::CentroidTracker;
    use crate::zones::Trigger;

    #[test]
    fn test_draw_zone_and_object() {
        let mut frame = RgbImage::new(200, 200);
        let zone = Zone::new(
            "Door",
            vec![
                Point::new(10.0, 10.0),
                Point::new(190.0, 10.0),
                Point::new(190.0, 190.0),
            ],
            vec![Trigger::Intrusion],
        );
        let mut tracker = CentroidTracker::default();
        tracker.update(&[BBox::new(50.0, 50.0, 80.0, 120.0)]);

        let annotator = Annotator::new(None);
        assert!(!annotator.has_font());
        let detections = [Detection::person(BBox::new(50.0, 50.0, 80.0, 120.0), 0.8)];
        annotator.draw(&mut frame, &[zone], &detections, tracker.objects());

        // 区域上边
        assert_eq!(*frame.get_pixel(100, 10), ZONE_COLOR);
        // 目标框左边
        let (r, g, b) = id_to_color(0);
        assert_eq!(*frame.get_pixel(50, 80), Rgb([r, g, b]));
        // 框内部不填充
        assert_eq!(*frame.get_pixel(65, 80), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_untracked_detections() {
        let mut frame = RgbImage::new(200, 200);
        let detections = [
            Detection::new(BBox::new(20.0, 20.0, 60.0, 40.0), "car", 0.7),
            Detection::person(BBox::new(100.0, 100.0, 130.0, 170.0), 0.9),
        ];

        // 非人员类别与未跟踪的人员同样画出
        Annotator::new(None).draw(&mut frame, &[], &detections, std::iter::empty());

        assert_eq!(*frame.get_pixel(20, 30), DETECTION_COLOR);
        assert_eq!(*frame.get_pixel(100, 130), DETECTION_COLOR);
        assert_eq!(*frame.get_pixel(40, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_missing_font_falls_back() {
        let annotator = Annotator::new(Some(Path::new("/nonexistent/font.ttf")));
        assert!(!annotator.has_font());
    }
}
