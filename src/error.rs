//! 错误类型 (Error types)

use thiserror::Error;

pub type Result<T, E = SentinelError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("I/O错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("图像错误: {0}")]
    Image(#[from] image::ImageError),

    #[error("缩放失败: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),

    #[error("图像缓冲区无效: {0}")]
    ImageBuffer(#[from] fast_image_resize::ImageBufferError),

    /// 视频源打开/读取失败
    #[error("视频源错误: {0}")]
    Capture(String),

    /// 检测器调用失败
    #[error("检测器错误: {0}")]
    Detector(String),

    #[error("区域配置无效: {0}")]
    ZoneConfig(String),

    #[error("未找到: {0}")]
    NotFound(String),

    /// 元数据存储写入失败
    #[error("存储错误: {0}")]
    Store(String),

    #[error("注册表已关闭")]
    Closed,
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for SentinelError {
    fn from(err: ort::Error) -> Self {
        SentinelError::Detector(err.to_string())
    }
}
