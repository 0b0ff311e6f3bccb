/// RTSP主动拉流 (FFmpeg)
/// RTSP pulling capture with software decoding
///
/// 每个捕获句柄一个解码线程:
/// FFmpeg 解码 → scale + rgb24 → CaptureFilter → 有界队列 → `Capture::read`
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame, Input};
use image::RgbImage;
use log::{debug, info, warn};

use super::capture::{redact_url, Capture, FrameSource};
use crate::{Result, SentinelError};

/// 缓冲帧数 (满时丢弃最旧帧, 保持低延迟)
const QUEUE_DEPTH: usize = 2;

/// FFmpeg视频源
pub struct FfmpegSource {
    width: u32,
    height: u32,
    open_timeout: Duration,
    read_timeout: Duration,
}

impl FfmpegSource {
    pub fn new(width: u32, height: u32, read_timeout: Duration) -> Self {
        Self {
            width,
            height,
            open_timeout: read_timeout,
            read_timeout,
        }
    }
}

impl FrameSource for FfmpegSource {
    fn open(&self, url: &str) -> Result<Box<dyn Capture>> {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(QUEUE_DEPTH);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let closed = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let filter = CaptureFilter {
            tx: frame_tx,
            overflow: frame_rx.clone(),
            closed: closed.clone(),
            total_frames: 0,
            dropped_frames: 0,
        };

        let url_owned = url.to_string();
        let filter_desc = format!("scale={}:{},format=rgb24", self.width, self.height);
        let running_flag = running.clone();
        thread::Builder::new()
            .name("ffmpeg-capture".to_string())
            .spawn(move || {
                run_pipeline(&url_owned, filter, &filter_desc, ready_tx);
                running_flag.store(false, Ordering::Release);
            })?;

        match ready_rx.recv_timeout(self.open_timeout) {
            Ok(Ok(())) => {
                info!("✅ 视频源已连接: {}", redact_url(url));
                Ok(Box::new(FfmpegCapture {
                    frames: frame_rx,
                    closed,
                    running,
                    read_timeout: self.read_timeout,
                }))
            }
            Ok(Err(e)) => Err(SentinelError::Capture(e)),
            Err(_) => {
                // 解码线程稍后看到关闭标志自行退出
                closed.store(true, Ordering::Release);
                Err(SentinelError::Capture(format!(
                    "连接超时 ({:?})",
                    self.open_timeout
                )))
            }
        }
    }
}

/// 解码线程主体: 构建并运行FFmpeg上下文, 直到流结束或被关闭
fn run_pipeline(
    url: &str,
    filter: CaptureFilter,
    filter_desc: &str,
    ready: Sender<std::result::Result<(), String>>,
) {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("capture", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    // RTSP传输优化: TCP + 5s socket超时
    let input = Input::new(url).set_input_opts(
        [
            ("rtsp_transport", "tcp"),
            ("rtsp_flags", "prefer_tcp"),
            ("timeout", "5000000"),
        ]
        .into(),
    );

    let ctx = match FfmpegContext::builder()
        .input(input)
        .filter_descs([filter_desc].into())
        .output(out)
        .build()
    {
        Ok(ctx) => ctx,
        Err(e) => {
            let _ = ready.send(Err(format!("构建失败: {}", e)));
            return;
        }
    };

    let sch = match ctx.start() {
        Ok(sch) => sch,
        Err(e) => {
            let _ = ready.send(Err(format!("启动失败: {}", e)));
            return;
        }
    };

    let _ = ready.send(Ok(()));
    let _ = sch.wait();
    debug!("📹 解码线程退出: {}", redact_url(url));
}

/// FFmpeg帧过滤器: rgb24帧 → RgbImage → 队列
struct CaptureFilter {
    tx: Sender<RgbImage>,
    overflow: Receiver<RgbImage>,
    closed: Arc<AtomicBool>,
    total_frames: usize,
    dropped_frames: usize,
}

impl CaptureFilter {
    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
    }
}

impl FrameFilter for CaptureFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> std::result::Result<(), String> {
        debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> std::result::Result<Option<Frame>, String> {
        // 捕获句柄已释放, 停止解码
        if self.closed.load(Ordering::Acquire) {
            return Err("capture closed".to_string());
        }

        self.total_frames += 1;

        let image = unsafe {
            // 基本检查：空帧或损坏帧
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.drop_frame("空帧/损坏帧");
                return Ok(None);
            }

            let raw = &*frame.as_ptr();
            let (w, h) = (raw.width, raw.height);
            if w <= 0 || h <= 0 || w > 8192 || h > 8192 {
                self.drop_frame("非法分辨率");
                return Ok(None);
            }

            // 缺少参考帧/无效比特流
            if raw.decode_error_flags & 0x03 != 0 {
                self.drop_frame("解码错误");
                return Ok(None);
            }

            let data = raw.data[0];
            let stride = raw.linesize[0] as usize;
            let row = w as usize * 3;
            if data.is_null() || stride < row {
                self.drop_frame("RGB平面异常");
                return Ok(None);
            }

            let mut buf = Vec::with_capacity(row * h as usize);
            for y in 0..h as usize {
                buf.extend_from_slice(std::slice::from_raw_parts(data.add(y * stride), row));
            }
            match RgbImage::from_raw(w as u32, h as u32, buf) {
                Some(img) => img,
                None => {
                    self.drop_frame("缓冲区尺寸不匹配");
                    return Ok(None);
                }
            }
        };

        // 队列满: 丢弃最旧帧再写入
        match self.tx.try_send(image) {
            Ok(()) => {}
            Err(TrySendError::Full(image)) => {
                let _ = self.overflow.try_recv();
                let _ = self.tx.try_send(image);
            }
            Err(TrySendError::Disconnected(_)) => return Err("capture closed".to_string()),
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        debug!(
            "✅ 解码统计: 总帧{} | 丢弃{}",
            self.total_frames, self.dropped_frames
        );
    }
}

/// FFmpeg捕获句柄, 丢弃即关闭
pub struct FfmpegCapture {
    frames: Receiver<RgbImage>,
    closed: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    read_timeout: Duration,
}

impl Capture for FfmpegCapture {
    fn read(&mut self) -> Result<RgbImage> {
        match self.frames.recv_timeout(self.read_timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(SentinelError::Capture(format!(
                "读帧超时 ({:?})",
                self.read_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(SentinelError::Capture("视频流已结束".to_string()))
            }
        }
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.running.load(Ordering::Acquire)
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}
