/// 检测系统 (Detection System)
///
/// - Detector: 目标检测能力 (所有会话共享一个实例)
/// - Tracker:  质心跟踪 (每路摄像头独立实例)
pub mod detector;
pub mod tracker;
pub mod types;
#[cfg(feature = "onnx")]
pub mod yolo;

pub use detector::{filter_classes, Detector};
pub use tracker::{CentroidTracker, TrackedObject};
pub use types::{BBox, Detection, Point, PERSON};
#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;
