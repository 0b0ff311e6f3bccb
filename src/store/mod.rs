/// 元数据存储 (Metadata stores)
///
/// - CameraStore:    摄像头登记表 (JSON), 实现 `StatusSink`
/// - FileEventStore: 告警事件 + 快照 (JSONL + JPEG), 实现 `EventSink`
pub mod camera;
pub mod events;

pub use camera::{Camera, CameraStore};
pub use events::{EventRecord, FileEventStore, DEFAULT_LIMIT};
