use std::fmt;

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::lyrics::LyricService;
use crate::source::TitleSource;
use crate::state::PlaybackPosition;
use crate::track::{Resolution, TrackDescriptor, TrackResolver, TrackSignal};
use crate::utils::title::clean_window_title;

/// 换歌侦测状态机的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// 当前认定的曲目与各信号一致
    Stable,
    /// 刚出现疑似换歌信号
    ChangeSuspected,
    /// 防抖等待中
    Debouncing,
    /// 正在解析新曲目
    Resolving,
}

/// 触发疑似换歌的信号种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspectReason {
    /// 总时长跳变
    DurationJump,
    /// 窗口标题与预期不符
    TitleDrift,
}

impl fmt::Display for SuspectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspectReason::DurationJump => write!(f, "总时长跳变"),
            SuspectReason::TitleDrift => write!(f, "标题漂移"),
        }
    }
}

/// 换歌侦测与曲目归并。
/// 弱信号（时长跳变、标题漂移）先防抖再解析，强身份信号直通。
pub struct Reconciler {
    cfg: MonitorConfig,
    /// 窗口标题里要剥掉的应用名后缀
    title_suffix: String,
    resolver: TrackResolver,
    lyrics: LyricService,
    state: ReconcileState,
    suspect_reason: Option<SuspectReason>,
    debounce_deadline: Option<Instant>,
    /// 最近一次认定的总时长基准
    last_total_secs: f64,
    /// 由已解析曲目推出的窗口标题基准
    expected_title: Option<String>,
    resolved: Option<TrackDescriptor>,
    last_title_poll: Option<Instant>,
}

impl Reconciler {
    pub fn new(
        cfg: MonitorConfig,
        title_suffix: String,
        resolver: TrackResolver,
        lyrics: LyricService,
    ) -> Self {
        Reconciler {
            cfg,
            title_suffix,
            resolver,
            lyrics,
            state: ReconcileState::Stable,
            suspect_reason: None,
            debounce_deadline: None,
            last_total_secs: 0.0,
            expected_title: None,
            resolved: None,
            last_title_poll: None,
        }
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn resolved(&self) -> Option<&TrackDescriptor> {
        self.resolved.as_ref()
    }

    /// 喂入一轮采样。position 必须来自可达的目标进程
    pub async fn observe(
        &mut self,
        position: PlaybackPosition,
        identity: Option<u64>,
        title_source: &mut dyn TitleSource,
    ) {
        if let Some(id) = identity {
            // 强信号在场就不跑弱信号侦测：已认定曲目与 id 不符时
            // （换歌或启动时的补解析）每周期重查，直到解析出来为止
            if self.resolved.as_ref().map(|t| t.id) != Some(id) {
                self.resolve_identity(id, position).await;
            } else if matches!(
                self.state,
                ReconcileState::ChangeSuspected | ReconcileState::Debouncing
            ) {
                // 身份读数还停在当前曲目，之前的弱信号疑似只是噪声
                info!("[侦测] 强身份信号仍为 id {}，撤销弱信号疑似", id);
                self.suspect_reason = None;
                self.debounce_deadline = None;
                self.state = ReconcileState::Stable;
                if let Some(track) = self.resolved.clone() {
                    // 拉回疑似阶段清掉的歌词
                    self.lyrics.load(track.id);
                }
            }
            return;
        }
        self.observe_weak(position, title_source).await;
    }

    async fn observe_weak(&mut self, position: PlaybackPosition, title_source: &mut dyn TitleSource) {
        match self.state {
            ReconcileState::Stable => {
                let total = position.total_secs;
                // 起播与跳转瞬间会读到无效总时长，本轮弱信号整体跳过，
                // 免得重绘中的标题把状态机拖进防抖
                if total < 1.0 {
                    return;
                }
                if (total - self.last_total_secs).abs() > self.cfg.duration_jump_secs {
                    debug!(
                        "[侦测] 总时长跳变: {:.1}s -> {:.1}s",
                        self.last_total_secs, total
                    );
                    self.suspect(SuspectReason::DurationJump, total);
                    return;
                }
                self.poll_title_drift(title_source, total);
            }
            ReconcileState::ChangeSuspected => {
                self.state = ReconcileState::Debouncing;
            }
            ReconcileState::Debouncing => {
                let due = self.debounce_deadline.map_or(true, |d| Instant::now() >= d);
                if due {
                    self.resolve_suspected(position, title_source).await;
                }
            }
            // 解析在一轮 observe 内同步完成，这里没有事可做
            ReconcileState::Resolving => {}
        }
    }

    /// 身份信号直通：不防抖，本地库直查优先。
    /// 解析不出来时下个周期还会再进来，直到认定曲目带上这个 id
    async fn resolve_identity(&mut self, id: u64, position: PlaybackPosition) {
        debug!("[侦测] 按身份信号解析: id {}", id);
        self.suspect_reason = None;
        self.debounce_deadline = None;
        self.lyrics.clear();
        self.state = ReconcileState::Resolving;

        let signal = TrackSignal {
            id: Some(id),
            title: None,
        };
        let expected_ms = (position.total_secs * 1000.0) as u64;
        match self.resolver.resolve(&signal, expected_ms).await {
            Resolution::Matched(track) => self.commit(track, position.total_secs),
            _ => {
                debug!("[侦测] 身份 id {} 暂时解析不出，保持原曲目", id);
                self.lyrics.abandon();
                self.state = ReconcileState::Stable;
            }
        }
    }

    fn poll_title_drift(&mut self, title_source: &mut dyn TitleSource, total: f64) {
        let Some(expected) = self.expected_title.clone() else {
            return;
        };
        let now = Instant::now();
        let due = self.last_title_poll.map_or(true, |t| {
            now.duration_since(t) >= Duration::from_millis(self.cfg.title_poll_interval_ms)
        });
        if !due {
            return;
        }
        self.last_title_poll = Some(now);

        let Some(raw) = title_source.read_title() else {
            return;
        };
        let cleaned = clean_window_title(&raw, &self.title_suffix);
        if cleaned != expected && cleaned.contains(" - ") {
            debug!("[侦测] 标题漂移: \"{}\" -> \"{}\"", expected, cleaned);
            self.suspect(SuspectReason::TitleDrift, total);
        }
    }

    fn suspect(&mut self, reason: SuspectReason, total_secs: f64) {
        info!("[侦测] 疑似换歌: {}，进入防抖", reason);
        // 立即换基准，防止同一跳变在防抖期间反复触发
        self.last_total_secs = total_secs;
        self.lyrics.clear();
        self.suspect_reason = Some(reason);
        self.debounce_deadline =
            Some(Instant::now() + Duration::from_millis(self.cfg.debounce_ms));
        self.state = ReconcileState::ChangeSuspected;
    }

    async fn resolve_suspected(
        &mut self,
        position: PlaybackPosition,
        title_source: &mut dyn TitleSource,
    ) {
        let reason = self
            .suspect_reason
            .take()
            .unwrap_or(SuspectReason::DurationJump);
        self.debounce_deadline = None;

        // 标题漂移在防抖结束后复核一次，回跳说明只是临时噪声
        if reason == SuspectReason::TitleDrift {
            if let (Some(expected), Some(raw)) =
                (self.expected_title.clone(), title_source.read_title())
            {
                if clean_window_title(&raw, &self.title_suffix) == expected {
                    info!("[侦测] 标题已回跳，取消本次换歌");
                    self.state = ReconcileState::Stable;
                    if let Some(track) = self.resolved.clone() {
                        // 拉回疑似阶段清掉的歌词
                        self.lyrics.load(track.id);
                    }
                    return;
                }
            }
        }

        self.state = ReconcileState::Resolving;
        let expected_ms = (position.total_secs * 1000.0) as u64;
        info!("[侦测] 防抖结束，开始解析 (预期时长 {}ms)", expected_ms);

        let mut last_candidate: Option<TrackDescriptor> = None;
        for attempt in 1..=self.cfg.resolve_max_attempts {
            if attempt > 1 {
                sleep(Duration::from_millis(self.cfg.resolve_retry_interval_ms)).await;
            }
            let title = title_source
                .read_title()
                .map(|raw| clean_window_title(&raw, &self.title_suffix));
            let signal = TrackSignal { id: None, title };
            match self.resolver.resolve(&signal, expected_ms).await {
                Resolution::Matched(track) => {
                    debug!("[侦测] 第 {} 次尝试解析成功", attempt);
                    self.commit(track, position.total_secs);
                    return;
                }
                Resolution::OutOfTolerance(track) => {
                    debug!("[侦测] 第 {} 次尝试仅有超容差候选: {}", attempt, track.title);
                    last_candidate = Some(track);
                }
                Resolution::NoMatch => {
                    debug!("[侦测] 第 {} 次尝试无结果", attempt);
                }
            }
        }

        // 重试耗尽。超容差候选按策略兜底，但绝不回灌当前曲目
        if self.cfg.force_accept_out_of_tolerance {
            if let Some(track) = last_candidate {
                if self.resolved.as_ref().map(|t| t.id) != Some(track.id) {
                    warn!(
                        "[侦测] 重试耗尽，强制采用超容差候选: {} (id {})",
                        track.title, track.id
                    );
                    self.commit(track, position.total_secs);
                    return;
                }
            }
        }

        warn!("[侦测] 解析失败，保持原曲目");
        self.lyrics.abandon();
        self.state = ReconcileState::Stable;
    }

    fn commit(&mut self, track: TrackDescriptor, total_secs: f64) {
        info!(
            "[侦测] 当前曲目: {} - {} (id {})",
            track.title,
            track.artist_display(),
            track.id
        );
        self.expected_title = Some(track.expected_title());
        self.last_total_secs = total_secs;
        self.lyrics.load(track.id);
        self.resolved = Some(track);
        self.suspect_reason = None;
        self.debounce_deadline = None;
        self.state = ReconcileState::Stable;
    }
}
