use std::sync::{Arc, Mutex};

use crate::track::TrackDescriptor;

/// 播放进度采样（秒）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackPosition {
    /// 已播放时长
    pub elapsed_secs: f64,
    /// 曲目总时长
    pub total_secs: f64,
}

impl PlaybackPosition {
    pub fn new(elapsed_secs: f64, total_secs: f64) -> Self {
        PlaybackPosition {
            elapsed_secs,
            total_secs,
        }
    }

    /// 播放进度百分比，范围 [0, 100]；总时长无效时为 0
    pub fn percentage(&self) -> f64 {
        if self.total_secs <= 0.0 {
            return 0.0;
        }
        (self.elapsed_secs / self.total_secs * 100.0).clamp(0.0, 100.0)
    }
}

/// 当前歌词行（原文 + 译文）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricLinePair {
    pub original: String,
    pub translation: String,
}

impl LyricLinePair {
    pub fn new(original: impl Into<String>, translation: impl Into<String>) -> Self {
        LyricLinePair {
            original: original.into(),
            translation: translation.into(),
        }
    }
}

/// 对外发布的播放状态快照
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// 是否正在播放（两次采样之间进度发生了变化）
    pub playing: bool,
    /// 目标进程是否可达
    pub process_active: bool,
    /// 已解析的当前曲目，未解析时为 None
    pub track: Option<TrackDescriptor>,
    /// 最近一次进度采样
    pub position: PlaybackPosition,
    /// 当前歌词行
    pub lyric_line: LyricLinePair,
}

/// 快照存储。整个进程唯一的共享可变状态，
/// 读写都在同一把锁内完成，读取方不会看到半更新的组合。
#[derive(Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<Mutex<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore::default()
    }

    /// 读取当前快照的完整副本
    pub fn read(&self) -> Snapshot {
        self.inner.lock().unwrap().clone()
    }

    /// 在同一临界区内整体更新快照
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut guard = self.inner.lock().unwrap();
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_zero_when_total_invalid() {
        assert_eq!(PlaybackPosition::new(10.0, 0.0).percentage(), 0.0);
        assert_eq!(PlaybackPosition::new(10.0, -5.0).percentage(), 0.0);
        assert_eq!(PlaybackPosition::new(0.0, 0.0).percentage(), 0.0);
    }

    #[test]
    fn test_percentage_in_bounds() {
        assert_eq!(PlaybackPosition::new(50.0, 200.0).percentage(), 25.0);
        assert_eq!(PlaybackPosition::new(0.0, 200.0).percentage(), 0.0);
        assert_eq!(PlaybackPosition::new(200.0, 200.0).percentage(), 100.0);
        // 读数异常时也不会越界
        assert_eq!(PlaybackPosition::new(300.0, 200.0).percentage(), 100.0);

        let samples = [
            (0.0, 0.0),
            (1.5, 240.0),
            (239.9, 240.0),
            (500.0, 240.0),
            (0.0, -1.0),
        ];
        for (elapsed, total) in samples {
            let p = PlaybackPosition::new(elapsed, total).percentage();
            assert!((0.0..=100.0).contains(&p), "percentage {} 越界", p);
        }
    }

    #[test]
    fn test_snapshot_store_replace_is_atomic() {
        let store = SnapshotStore::new();
        store.update(|s| {
            s.playing = true;
            s.process_active = true;
            s.position = PlaybackPosition::new(12.0, 240.0);
            s.lyric_line = LyricLinePair::new("你好", "hello");
        });

        let snap = store.read();
        assert!(snap.playing);
        assert!(snap.process_active);
        assert_eq!(snap.position.elapsed_secs, 12.0);
        assert_eq!(snap.lyric_line.original, "你好");
    }
}
