// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 ONNX 检测器
// 包含: 模型加载、预处理 (等比缩放 + 灰边填充)、推理、后处理 (解码 + NMS)

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use image::{imageops, imageops::FilterType, RgbImage};
use log::{debug, info};
use ndarray::{Array, ArrayViewD, Ix2};
use ort::{GraphOptimizationLevel, Session};

use super::detector::{non_max_suppression, Detector};
use super::types::{BBox, Detection};
use crate::config::DetectorConfig;
use crate::{Result, SentinelError};

/// COCO 80类
pub const COCO_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// YOLOv8 检测模型
///
/// ONNX Runtime 会话放在 `Mutex` 中, 多路会话的推理调用被串行化。
pub struct YoloDetector {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_size: u32,
    conf: f32,
    iou: f32,
    names: Vec<String>,
}

impl YoloDetector {
    /// 从配置加载模型
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?;

        #[cfg(feature = "cuda")]
        let builder = builder.with_execution_providers([
            ort::TensorRTExecutionProvider::default().build(),
            ort::CUDAExecutionProvider::default().build(),
        ])?;

        let session = builder.commit_from_file(&config.model)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| SentinelError::Detector("模型缺少输入节点".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| SentinelError::Detector("模型缺少输出节点".to_string()))?;

        info!(
            "✅ 检测模型加载成功: {} (输入 {} {}x{}, 输出 {})",
            config.model.display(),
            input_name,
            config.input_size,
            config.input_size,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_size: config.input_size,
            conf: config.conf,
            iou: config.iou,
            names: COCO_NAMES.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn scale_wh(&self, w0: f32, h0: f32) -> (f32, f32, f32) {
        let size = self.input_size as f32;
        let r = (size / w0).min(size / h0);
        (r, (w0 * r).round(), (h0 * r).round())
    }

    /// 预处理: 等比缩放到左上角, 其余填充灰色, NCHW 归一化
    fn preprocess(&self, frame: &RgbImage) -> (Array<f32, ndarray::Ix4>, f32) {
        let (w0, h0) = frame.dimensions();
        let (ratio, w1, h1) = self.scale_wh(w0 as f32, h0 as f32);
        let resized = imageops::resize(
            frame,
            (w1 as u32).max(1),
            (h1 as u32).max(1),
            FilterType::Triangle,
        );

        let size = self.input_size as usize;
        let mut xs = Array::from_elem((1, 3, size, size), 144.0 / 255.0);
        for (x, y, rgb) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            if x >= size || y >= size {
                continue;
            }
            let [r, g, b] = rgb.0;
            xs[[0, 0, y, x]] = r as f32 / 255.0;
            xs[[0, 1, y, x]] = g as f32 / 255.0;
            xs[[0, 2, y, x]] = b as f32 / 255.0;
        }
        (xs, ratio)
    }

    /// 后处理: [1, 4 + nc, anchors] → 检测框 (帧坐标)
    fn postprocess(
        &self,
        output: ArrayViewD<'_, f32>,
        ratio: f32,
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>> {
        let shape = output.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(SentinelError::Detector(format!(
                "不支持的输出形状: {:?}",
                shape
            )));
        }

        let preds = output
            .index_axis(ndarray::Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|e| SentinelError::Detector(e.to_string()))?;
        let nc = preds.shape()[0] - 4;
        let anchors = preds.shape()[1];

        let mut dets = Vec::new();
        for i in 0..anchors {
            let (class_id, score) = (0..nc)
                .map(|c| (c, preds[[4 + c, i]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if score < self.conf {
                continue;
            }

            let (cx, cy, w, h) = (preds[[0, i]], preds[[1, i]], preds[[2, i]], preds[[3, i]]);
            let bbox = BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
                .scale(1.0 / ratio, 1.0 / ratio)
                .clamp(width as f32, height as f32);
            let label = self
                .names
                .get(class_id)
                .cloned()
                .unwrap_or_else(|| format!("class{}", class_id));
            dets.push(Detection::new(bbox, label, score));
        }

        non_max_suppression(&mut dets, self.iou);
        Ok(dets)
    }
}

impl Detector for YoloDetector {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (xs, ratio) = self.preprocess(frame);

        let t_run = Instant::now();
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session.run(ort::inputs![self.input_name.as_str() => xs.view()]?)?;
        let output = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        let dets = self.postprocess(output, ratio, frame.width(), frame.height())?;
        debug!("[Model Inference]: {:?} → {} 个目标", t_run.elapsed(), dets.len());

        Ok(dets)
    }

    fn name(&self) -> &str {
        "yolov8-onnx"
    }
}
