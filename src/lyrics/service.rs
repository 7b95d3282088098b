use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::lyrics::{LyricPacket, LyricTimeline, RawLyric};
use crate::source::LyricSource;
use crate::state::{LyricLinePair, SnapshotStore};

/// 歌词尚未就绪时的占位文本
const LOADING: &str = "加载中...";
/// 拉取完成但该曲目没有歌词（纯音乐等）
const NO_LYRIC: &str = "暂无歌词";

#[derive(Default)]
struct LyricState {
    /// 当前加载的曲目 id，0 表示未加载。
    /// 在途请求完成时与它比对，不相等的结果整体丢弃。
    current_id: u64,
    /// 已清空时间轴、等待下一次加载
    pending: bool,
    /// 有请求在途
    in_flight: bool,
    timeline: LyricTimeline,
    packet: Option<LyricPacket>,
}

/// 歌词同步器：负责拉取、解析、按进度给出当前行。
/// 加载以曲目 id 作为代际标记，后发的 load 会使先前在途结果作废。
#[derive(Clone)]
pub struct LyricService {
    source: Arc<dyn LyricSource>,
    snapshot: SnapshotStore,
    inner: Arc<Mutex<LyricState>>,
}

impl LyricService {
    pub fn new(source: Arc<dyn LyricSource>, snapshot: SnapshotStore) -> Self {
        LyricService {
            source,
            snapshot,
            inner: Arc::new(Mutex::new(LyricState::default())),
        }
    }

    /// 加载指定曲目的歌词。同一 id 重复调用是幂等的：
    /// 不发新请求，也不清掉已就绪的时间轴。
    /// 返回后台任务句柄，便于调用方等待加载完成。
    pub fn load(&self, track_id: u64) -> Option<JoinHandle<()>> {
        {
            let mut state = self.inner.lock().unwrap();
            if state.current_id == track_id {
                return None;
            }
            state.current_id = track_id;
            state.pending = false;
            state.in_flight = true;
            state.timeline = LyricTimeline::default();
            state.packet = None;
        }
        info!("[歌词] 加载歌词: id {}", track_id);

        let service = self.clone();
        Some(tokio::spawn(async move {
            service.fetch_and_publish(track_id).await;
        }))
    }

    /// 疑似切歌：清空已发布的时间轴并挂出加载占位。
    /// 同时把 current_id 归零，保证疑似被撤销后能重新拉回同一首的歌词。
    pub fn clear(&self) {
        {
            let mut state = self.inner.lock().unwrap();
            state.current_id = 0;
            state.pending = true;
            state.in_flight = false;
            state.timeline = LyricTimeline::default();
            state.packet = None;
        }
        self.snapshot.update(|snap| {
            snap.lyric_line = LyricLinePair::new(LOADING, "");
        });
    }

    /// 解析失败放弃本轮切歌，撤下加载占位
    pub fn abandon(&self) {
        let mut state = self.inner.lock().unwrap();
        state.pending = false;
    }

    /// 按播放进度取当前歌词行。
    /// 时间轴为空时根据加载状态给出占位文本。
    pub fn line_at(&self, elapsed_secs: f64) -> LyricLinePair {
        let state = self.inner.lock().unwrap();
        if !state.timeline.is_empty() {
            return match state.timeline.line_at(elapsed_secs) {
                Some(entry) => LyricLinePair::new(entry.text.clone(), entry.translation.clone()),
                // 还没唱到第一句
                None => LyricLinePair::default(),
            };
        }
        if state.pending || state.in_flight {
            LyricLinePair::new(LOADING, "")
        } else {
            LyricLinePair::new(NO_LYRIC, "")
        }
    }

    /// 当前曲目的完整歌词负载
    pub fn packet(&self) -> Option<LyricPacket> {
        self.inner.lock().unwrap().packet.clone()
    }

    async fn fetch_and_publish(&self, track_id: u64) {
        let raw = match self.source.fetch_lyric(track_id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("[歌词] 获取歌词失败: id {} {}", track_id, e);
                RawLyric::default()
            }
        };
        let timeline = match LyricTimeline::build(&raw.lrc, &raw.tlyric) {
            Ok(timeline) => timeline,
            Err(e) => {
                warn!("[歌词] 解析歌词失败: id {} {}", track_id, e);
                LyricTimeline::default()
            }
        };
        let packet = LyricPacket::from_raw(track_id, &raw);
        let line_count = timeline.entries().len();

        {
            let mut state = self.inner.lock().unwrap();
            if state.current_id != track_id {
                debug!("[歌词] 结果已过期，丢弃: id {}", track_id);
                return;
            }
            state.timeline = timeline;
            state.packet = Some(packet);
            state.in_flight = false;
        }
        info!("[歌词] 歌词就绪: id {} 共 {} 行", track_id, line_count);

        // 发布路径与轮询循环共用同一把快照锁，读取方不会看到交错的中间态
        let elapsed = self.snapshot.read().position.elapsed_secs;
        let line = self.line_at(elapsed);
        self.snapshot.update(|snap| snap.lyric_line = line);
    }
}
