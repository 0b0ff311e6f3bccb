/// 视频流系统 (Stream System)
///
/// - Capture/FrameSource: 视频源抽象 (FFmpeg 实现见 `ffmpeg`)
/// - StreamSession:       单路摄像头工作线程
/// - StreamRegistry:      会话注册表, 持有共享检测器
/// - FrameSlot:           最新帧单槽缓冲
pub mod annotate;
pub mod capture;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frame;
pub mod registry;
pub mod session;

pub use annotate::Annotator;
pub use capture::{redact_url, Capture, FrameSource};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegSource;
pub use frame::{encode_jpeg, normalize, FrameSlot};
pub use registry::StreamRegistry;
pub use session::{ConnectionState, SessionDeps, SessionHandle, StopSignal, StreamSession};
