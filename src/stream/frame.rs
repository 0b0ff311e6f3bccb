//! 帧处理工具 + 单槽帧缓冲
//!
//! - `normalize`:   任意分辨率 → 固定分辨率 (fast_image_resize)
//! - `encode_jpeg`: RGB → JPEG
//! - `FrameSlot`:   最新帧单槽缓冲, 后写覆盖, 读写互不等待

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::{Result, SentinelError};

/// 缩放到固定分辨率, 尺寸一致时原样返回
pub fn normalize(frame: RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let (w0, h0) = frame.dimensions();
    if (w0, h0) == (width, height) {
        return Ok(frame);
    }
    if w0 == 0 || h0 == 0 {
        return Err(SentinelError::Capture(format!("非法分辨率 {}x{}", w0, h0)));
    }

    let src = fr::images::Image::from_vec_u8(w0, h0, frame.into_raw(), fr::PixelType::U8x3)?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src,
        &mut dst,
        &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
    )?;

    RgbImage::from_raw(width, height, dst.buffer().to_vec())
        .ok_or_else(|| SentinelError::Capture("缩放结果尺寸不匹配".to_string()))
}

/// 编码JPEG
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity((frame.width() * frame.height() / 4) as usize);
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode_image(frame)?;
    Ok(buf)
}

#[derive(Default)]
struct SlotState {
    frame: Option<Arc<Vec<u8>>>,
    seq: u64,
}

/// 单槽帧缓冲
///
/// 槽内要么为空, 要么是一帧完整编码的图像。锁只在交换指针时持有。
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    updated: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 发布新帧, 替换旧帧
    pub fn publish(&self, jpeg: Vec<u8>) -> u64 {
        let frame = Arc::new(jpeg);
        let seq = {
            let mut state = self.lock();
            state.frame = Some(frame);
            state.seq += 1;
            state.seq
        };
        self.updated.notify_all();
        seq
    }

    /// 最新帧 (非阻塞)
    pub fn latest(&self) -> Option<Arc<Vec<u8>>> {
        self.lock().frame.clone()
    }

    /// 已发布帧数
    pub fn seq(&self) -> u64 {
        self.lock().seq
    }

    /// 等待序号大于 `seq` 的帧, 超时返回 None
    pub fn wait_newer(&self, seq: u64, timeout: Duration) -> Option<(u64, Arc<Vec<u8>>)> {
        let guard = self.lock();
        let (state, _) = self
            .updated
            .wait_timeout_while(guard, timeout, |s| s.seq <= seq)
            .unwrap_or_else(PoisonError::into_inner);
        if state.seq > seq {
            state.frame.clone().map(|f| (state.seq, f))
        } else {
            None
        }
    }

    pub fn clear(&self) {
        self.lock().frame = None;
    }
}
