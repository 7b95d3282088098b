use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::lyrics::{LyricPacket, LyricService, RawLyric};
use crate::source::{LocalStoreSource, PlayRecord};
use crate::state::{Snapshot, SnapshotStore};
use crate::utils::format_clock;

const HISTORY_DEFAULT_LIMIT: u32 = 20;
const HISTORY_MAX_LIMIT: u32 = 100;

/// 各路由共享的上下文
pub struct ApiContext {
    pub snapshot: SnapshotStore,
    pub lyrics: LyricService,
    pub store: Arc<dyn LocalStoreSource>,
}

/// 启动状态服务并一直监听下去
pub async fn run(cfg: ServerConfig, ctx: ApiContext) -> Result<()> {
    let app = Router::new()
        .route("/info", get(info_handler))
        .route("/lyrics", get(lyrics_handler))
        .route("/history", get(history_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(ctx));

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听 {} 失败", addr))?;
    info!("[服务] 状态接口监听于 http://{}", addr);
    axum::serve(listener, app)
        .await
        .context("状态服务异常退出")?;
    Ok(())
}

/// GET /info 的完整视图
#[derive(Debug, Serialize)]
struct InfoResponse {
    playing: bool,
    process_active: bool,
    basic_info: BasicInfo,
    playback: PlaybackInfo,
    lyrics: LyricsInfo,
}

#[derive(Debug, Serialize)]
struct BasicInfo {
    id: u64,
    name: String,
    artist: String,
    album: String,
    cover_url: String,
    /// 毫秒
    duration: u64,
}

#[derive(Debug, Serialize)]
struct PlaybackInfo {
    current_sec: f64,
    total_sec: f64,
    percentage: f64,
    formatted_current: String,
    formatted_total: String,
}

#[derive(Debug, Serialize)]
struct LyricsInfo {
    current_line: String,
    current_trans: String,
}

impl From<Snapshot> for InfoResponse {
    fn from(snap: Snapshot) -> Self {
        // 没有已解析曲目时只在这一层补零，核心状态里不伪造数据
        let basic_info = match &snap.track {
            Some(track) => BasicInfo {
                id: track.id,
                name: track.title.clone(),
                artist: track.artist_display(),
                album: track.album.clone(),
                cover_url: track.cover_url.clone(),
                duration: track.duration_ms,
            },
            None => BasicInfo {
                id: 0,
                name: String::new(),
                artist: String::new(),
                album: String::new(),
                cover_url: String::new(),
                duration: 0,
            },
        };
        InfoResponse {
            playing: snap.playing,
            process_active: snap.process_active,
            basic_info,
            playback: PlaybackInfo {
                current_sec: snap.position.elapsed_secs,
                total_sec: snap.position.total_secs,
                percentage: snap.position.percentage(),
                formatted_current: format_clock(snap.position.elapsed_secs),
                formatted_total: format_clock(snap.position.total_secs),
            },
            lyrics: LyricsInfo {
                current_line: snap.lyric_line.original,
                current_trans: snap.lyric_line.translation,
            },
        }
    }
}

async fn info_handler(State(ctx): State<Arc<ApiContext>>) -> Json<InfoResponse> {
    Json(ctx.snapshot.read().into())
}

async fn lyrics_handler(State(ctx): State<Arc<ApiContext>>) -> Json<LyricPacket> {
    // 还没加载过任何歌词时给全空负载
    let packet = ctx
        .lyrics
        .packet()
        .unwrap_or_else(|| LyricPacket::from_raw(0, &RawLyric::default()));
    Json(packet)
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    code: u16,
    data: Vec<PlayRecord>,
}

async fn history_handler(
    State(ctx): State<Arc<ApiContext>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query
        .limit
        .unwrap_or(HISTORY_DEFAULT_LIMIT)
        .min(HISTORY_MAX_LIMIT);
    let data = ctx.store.recent(limit).await;
    Json(HistoryResponse { code: 200, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fakes::{InstantLyrics, MemoryStore};
    use crate::state::{LyricLinePair, PlaybackPosition};
    use crate::track::TrackDescriptor;

    fn sample_track() -> TrackDescriptor {
        TrackDescriptor {
            id: 186016,
            title: "夜曲".to_string(),
            artists: vec!["周杰伦".to_string(), "费玉清".to_string()],
            album: "十一月的萧邦".to_string(),
            cover_url: "http://example.com/cover.jpg".to_string(),
            duration_ms: 225_000,
        }
    }

    #[test]
    fn test_info_zero_filled_without_track() {
        let resp = InfoResponse::from(Snapshot::default());
        assert_eq!(resp.basic_info.id, 0);
        assert_eq!(resp.basic_info.name, "");
        assert_eq!(resp.basic_info.duration, 0);
        assert_eq!(resp.playback.percentage, 0.0);
        assert_eq!(resp.playback.formatted_current, "00:00");
        assert_eq!(resp.playback.formatted_total, "00:00");
    }

    #[test]
    fn test_info_reflects_snapshot() {
        let mut snap = Snapshot::default();
        snap.playing = true;
        snap.process_active = true;
        snap.track = Some(sample_track());
        snap.position = PlaybackPosition::new(65.0, 225.0);
        snap.lyric_line = LyricLinePair::new("一群嗜血的蚂蚁", "a swarm of ants");

        let resp = InfoResponse::from(snap);
        assert!(resp.playing);
        assert_eq!(resp.basic_info.artist, "周杰伦 / 费玉清");
        assert_eq!(resp.playback.formatted_current, "01:05");
        assert_eq!(resp.playback.formatted_total, "03:45");
        assert_eq!(resp.lyrics.current_line, "一群嗜血的蚂蚁");
        assert_eq!(resp.lyrics.current_trans, "a swarm of ants");
    }

    #[tokio::test]
    async fn test_history_limit_defaults_and_caps() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..150u64 {
            let mut track = sample_track();
            track.id = i + 1;
            store.push_record(i as i64, track);
        }
        let ctx = Arc::new(ApiContext {
            snapshot: SnapshotStore::new(),
            lyrics: LyricService::new(
                Arc::new(InstantLyrics::with_lyric(RawLyric::default())),
                SnapshotStore::new(),
            ),
            store,
        });

        // 不带参数按默认条数，最新的排最前
        let Json(resp) = history_handler(State(ctx.clone()), Query(HistoryQuery { limit: None })).await;
        assert_eq!(resp.code, 200);
        assert_eq!(resp.data.len(), 20);
        assert_eq!(resp.data[0].playtime, 149);

        // 超出上限的请求被压到上限
        let Json(resp) =
            history_handler(State(ctx), Query(HistoryQuery { limit: Some(500) })).await;
        assert_eq!(resp.data.len(), 100);
    }
}
