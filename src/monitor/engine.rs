use tokio::time::{sleep, Duration};
use tracing::info;

use crate::config::MonitorConfig;
use crate::lyrics::LyricService;
use crate::monitor::Reconciler;
use crate::source::{IdentitySource, PositionSource, TitleSource};
use crate::state::{LyricLinePair, SnapshotStore};

/// 轮询引擎：每个周期采一轮信号、喂给换歌侦测、整体重发快照。
/// 目标不可达时降级快照并拉长下一轮的间隔。
pub struct MonitorEngine {
    cfg: MonitorConfig,
    position: Box<dyn PositionSource>,
    identity: Option<Box<dyn IdentitySource>>,
    title: Box<dyn TitleSource>,
    reconciler: Reconciler,
    lyrics: LyricService,
    snapshot: SnapshotStore,
    last_elapsed: Option<f64>,
}

impl MonitorEngine {
    pub fn new(
        cfg: MonitorConfig,
        position: Box<dyn PositionSource>,
        identity: Option<Box<dyn IdentitySource>>,
        title: Box<dyn TitleSource>,
        reconciler: Reconciler,
        lyrics: LyricService,
        snapshot: SnapshotStore,
    ) -> Self {
        MonitorEngine {
            cfg,
            position,
            identity,
            title,
            reconciler,
            lyrics,
            snapshot,
            last_elapsed: None,
        }
    }

    pub async fn run(mut self) {
        info!("[监控] 轮询启动，周期 {}ms", self.cfg.poll_interval_ms);
        loop {
            let delay = self.tick().await;
            sleep(delay).await;
        }
    }

    /// 跑一个轮询周期，返回距下个周期的间隔
    pub(crate) async fn tick(&mut self) -> Duration {
        let Some(position) = self.position.read_position() else {
            if self.last_elapsed.take().is_some() {
                info!("[监控] 目标进程不可达，进入退避");
            }
            self.snapshot.update(|snap| {
                snap.process_active = false;
                snap.playing = false;
            });
            return Duration::from_millis(self.cfg.reconnect_interval_ms);
        };

        let identity = self.identity.as_mut().and_then(|src| src.read_identity());
        self.reconciler
            .observe(position, identity, self.title.as_mut())
            .await;

        let playing = match self.last_elapsed {
            Some(prev) => position.elapsed_secs != prev,
            None => false,
        };
        self.last_elapsed = Some(position.elapsed_secs);

        let track = self.reconciler.resolved().cloned();
        let lyric_line = if track.is_some() {
            self.lyrics.line_at(position.elapsed_secs)
        } else {
            LyricLinePair::default()
        };
        self.snapshot.update(|snap| {
            snap.process_active = true;
            snap.playing = playing;
            snap.position = position;
            snap.track = track;
            snap.lyric_line = lyric_line;
        });

        Duration::from_millis(self.cfg.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::lyrics::RawLyric;
    use crate::source::fakes::{
        InstantLyrics, MemoryStore, ScriptedCatalog, ScriptedIdentity, ScriptedPositions,
        ScriptedTitles,
    };
    use crate::track::{TrackDescriptor, TrackResolver};

    fn track(id: u64, title: &str, artist: &str, duration_ms: u64) -> TrackDescriptor {
        TrackDescriptor {
            id,
            title: title.to_string(),
            artists: vec![artist.to_string()],
            album: String::new(),
            cover_url: String::new(),
            duration_ms,
        }
    }

    fn build_engine(
        store: Arc<MemoryStore>,
        positions: Vec<Option<(f64, f64)>>,
        identities: Vec<Option<u64>>,
        titles: Vec<Option<&str>>,
    ) -> (MonitorEngine, SnapshotStore) {
        let snapshot = SnapshotStore::new();
        let catalog = Arc::new(ScriptedCatalog::default());
        let resolver = TrackResolver::new(store, catalog, 3000);
        let lyrics = LyricService::new(
            Arc::new(InstantLyrics::with_lyric(RawLyric::default())),
            snapshot.clone(),
        );
        let reconciler = Reconciler::new(
            MonitorConfig::default(),
            " - 网易云音乐".to_string(),
            resolver,
            lyrics.clone(),
        );
        let engine = MonitorEngine::new(
            MonitorConfig::default(),
            Box::new(ScriptedPositions::new(positions)),
            Some(Box::new(ScriptedIdentity::new(identities))),
            Box::new(ScriptedTitles::new(titles)),
            reconciler,
            lyrics,
            snapshot.clone(),
        );
        (engine, snapshot)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_resolves_track_and_playing_flag() {
        let store = Arc::new(MemoryStore::new());
        store.set_latest(Some(track(9, "稻香", "周杰伦", 210_000)));
        let (mut engine, snapshot) = build_engine(
            store,
            vec![Some((0.0, 200.0)), Some((50.0, 200.0)), Some((0.0, 210.0))],
            vec![None],
            vec![None],
        );

        // 第一拍：总时长 0 -> 200 触发疑似
        engine.tick().await;
        let snap = snapshot.read();
        assert!(snap.process_active);
        assert!(!snap.playing);
        assert!(snap.track.is_none());

        // 第二拍：进入防抖，进度在走所以 playing 置位
        engine.tick().await;
        assert!(snapshot.read().playing);

        // 防抖期满后的一拍：总时长已变成 210，按它解析并命中本地库
        tokio::time::advance(Duration::from_millis(1300)).await;
        engine.tick().await;

        let snap = snapshot.read();
        assert_eq!(snap.track.as_ref().unwrap().id, 9);
        assert_eq!(snap.track.as_ref().unwrap().title, "稻香");
        // 50.0 -> 0.0 也是进度变化，仍算播放中
        assert!(snap.playing);
        assert_eq!(snap.position.total_secs, 210.0);
        assert_eq!(snap.position.percentage(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_source_backs_off_and_recovers() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, snapshot) = build_engine(
            store,
            vec![None, None, Some((5.0, 200.0))],
            vec![None],
            vec![None],
        );

        // 不可达：快照降级，下一轮按重连间隔退避
        let delay = engine.tick().await;
        assert_eq!(delay, Duration::from_millis(2000));
        let snap = snapshot.read();
        assert!(!snap.process_active);
        assert!(!snap.playing);

        let delay = engine.tick().await;
        assert_eq!(delay, Duration::from_millis(2000));

        // 恢复可达：回到正常轮询节奏，重连后第一拍不判定播放中
        let delay = engine.tick().await;
        assert_eq!(delay, Duration::from_millis(100));
        let snap = snapshot.read();
        assert!(snap.process_active);
        assert!(!snap.playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_signal_resolves_without_debounce() {
        let store = Arc::new(MemoryStore::new());
        store.push_record(100, track(42, "晴天", "周杰伦", 269_000));
        let (mut engine, snapshot) = build_engine(
            store,
            vec![Some((1.0, 269.0))],
            vec![Some(42)],
            vec![None],
        );

        // 身份信号在场时第一拍就解析完成，不经过防抖
        engine.tick().await;
        let snap = snapshot.read();
        assert_eq!(snap.track.as_ref().unwrap().id, 42);
        assert_eq!(snap.track.as_ref().unwrap().title, "晴天");
    }
}
