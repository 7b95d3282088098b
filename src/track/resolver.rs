use std::sync::Arc;

use strsim::jaro_winkler;
use tracing::{debug, warn};

use crate::source::{CatalogSource, LocalStoreSource};
use crate::track::TrackDescriptor;
use crate::utils::title::ParsedTitle;

/// 一次解析可用的全部信号
#[derive(Debug, Clone, Default)]
pub struct TrackSignal {
    /// 内存中读到的强身份 id，存在时直接走 id 查询
    pub id: Option<u64>,
    /// 清洗后的窗口标题
    pub title: Option<String>,
}

/// 单次解析尝试的结论
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// 身份直查命中，或时长在容差内的文本匹配
    Matched(TrackDescriptor),
    /// 文本匹配但时长超出容差，只在重试耗尽后按策略兜底使用
    OutOfTolerance(TrackDescriptor),
    /// 没有任何可用候选
    NoMatch,
}

/// 曲目解析器：本地库优先，在线搜索兜底
pub struct TrackResolver {
    store: Arc<dyn LocalStoreSource>,
    catalog: Arc<dyn CatalogSource>,
    tolerance_ms: u64,
}

impl TrackResolver {
    pub fn new(
        store: Arc<dyn LocalStoreSource>,
        catalog: Arc<dyn CatalogSource>,
        tolerance_ms: u64,
    ) -> Self {
        TrackResolver {
            store,
            catalog,
            tolerance_ms,
        }
    }

    pub async fn resolve(&self, signal: &TrackSignal, expected_ms: u64) -> Resolution {
        if let Some(id) = signal.id {
            return self.resolve_by_id(id).await;
        }
        self.resolve_by_title(signal.title.as_deref(), expected_ms)
            .await
    }

    /// 强身份路径：本地库直查，查不到再走在线详情接口。
    /// id 本身已足够可信，不再做时长校验。
    async fn resolve_by_id(&self, id: u64) -> Resolution {
        if let Some(track) = self.store.find_by_id(id).await {
            debug!("[解析] 本地库命中 id {}: {}", id, track.title);
            return Resolution::Matched(track);
        }
        match self.catalog.song_detail(id).await {
            Ok(Some(track)) => {
                debug!("[解析] 在线详情命中 id {}: {}", id, track.title);
                Resolution::Matched(track)
            }
            Ok(None) => {
                warn!("[解析] id {} 在本地库与在线接口均无记录", id);
                Resolution::NoMatch
            }
            Err(e) => {
                warn!("[解析] 获取歌曲详情失败: {}", e);
                Resolution::NoMatch
            }
        }
    }

    /// 弱信号路径：先信本地库最近一条播放记录，时长对不上再按窗口标题搜索。
    /// 本地库查询由 mtime 检测把关，文件没动过就不再读库。
    async fn resolve_by_title(&self, title: Option<&str>, expected_ms: u64) -> Resolution {
        let mut fallback: Option<TrackDescriptor> = None;

        if self.store.has_changed().await {
            if let Some(latest) = self.store.latest().await {
                let delta = latest.duration_ms.abs_diff(expected_ms);
                if delta <= self.tolerance_ms {
                    debug!("[解析] 本地库最近记录时长吻合: {} ({}ms 偏差)", latest.title, delta);
                    return Resolution::Matched(latest);
                }
                debug!("[解析] 本地库最近记录时长偏差过大: {} ({}ms 偏差)", latest.title, delta);
                fallback = Some(latest);
            }
        }

        if let Some(title) = title.filter(|t| !t.is_empty()) {
            let parsed = ParsedTitle::parse(title);
            let keyword = parsed.keyword();
            match self.catalog.search(&keyword).await {
                Ok(candidates) => {
                    match pick_candidate(&parsed, candidates, expected_ms, self.tolerance_ms) {
                        Picked::Within(track) => return Resolution::Matched(track),
                        Picked::Outside(track) => fallback = Some(track),
                        Picked::Nothing => {}
                    }
                }
                Err(e) => warn!("[解析] 搜索 \"{}\" 失败: {}", keyword, e),
            }
        }

        match fallback {
            Some(track) => Resolution::OutOfTolerance(track),
            None => Resolution::NoMatch,
        }
    }
}

enum Picked {
    Within(TrackDescriptor),
    Outside(TrackDescriptor),
    Nothing,
}

/// 从搜索结果里挑选候选。
/// 歌名与歌手都通过文本匹配的候选才有资格；容差内取时长偏差最小的，
/// 偏差相同再比歌名相似度。容差外的最优候选单独留给兜底逻辑。
fn pick_candidate(
    parsed: &ParsedTitle,
    candidates: Vec<TrackDescriptor>,
    expected_ms: u64,
    tolerance_ms: u64,
) -> Picked {
    let mut within: Option<(u64, TrackDescriptor)> = None;
    let mut outside: Option<(u64, TrackDescriptor)> = None;

    for cand in candidates {
        if !parsed.matches(&cand) {
            continue;
        }
        let delta = cand.duration_ms.abs_diff(expected_ms);
        let slot = if delta <= tolerance_ms {
            &mut within
        } else {
            &mut outside
        };
        let replace = match slot {
            Some((best_delta, best)) => {
                delta < *best_delta
                    || (delta == *best_delta
                        && title_similarity(parsed, &cand) > title_similarity(parsed, best))
            }
            None => true,
        };
        if replace {
            *slot = Some((delta, cand));
        }
    }

    if let Some((delta, track)) = within {
        debug!(
            "[解析] 搜索命中: {} - {} ({}ms 偏差)",
            track.title,
            track.artist_display(),
            delta
        );
        return Picked::Within(track);
    }
    if let Some((delta, track)) = outside {
        debug!("[解析] 搜索仅有超容差候选: {} ({}ms 偏差)", track.title, delta);
        return Picked::Outside(track);
    }
    Picked::Nothing
}

fn title_similarity(parsed: &ParsedTitle, cand: &TrackDescriptor) -> f64 {
    jaro_winkler(&parsed.song.to_lowercase(), &cand.title.to_lowercase())
}
