use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::lyrics::RawLyric;
use crate::source::{CatalogSource, LyricSource};
use crate::track::TrackDescriptor;

const API_BASE: &str = "http://music.163.com/api";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.164 Safari/537.36";
const REFERER: &str = "https://music.163.com";

/// 网易云音乐在线接口客户端。
/// 桌面客户端同款明文 /api 接口，不需要 weapi 加密。
pub struct NeteaseClient {
    client: reqwest::Client,
    search_limit: u32,
}

impl NeteaseClient {
    pub fn new(search_limit: u32, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("构建 HTTP 客户端失败")?;
        Ok(NeteaseClient {
            client,
            search_limit,
        })
    }

    async fn request_json(&self, req: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let resp = req
            .header("Referer", REFERER)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("{}请求失败: HTTP {}", what, status));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CatalogSource for NeteaseClient {
    async fn search(&self, keyword: &str) -> Result<Vec<TrackDescriptor>> {
        let url = format!("{}/cloudsearch/pc", API_BASE);
        let form = json!({
            "s": keyword,
            "type": 1,
            "offset": 0,
            "total": true,
            "limit": self.search_limit,
        });

        debug!("[曲库] 搜索关键词: '{}'", keyword);
        let json = self
            .request_json(self.client.post(&url).form(&form), "搜索")
            .await?;

        let songs = match json.pointer("/result/songs").and_then(Value::as_array) {
            Some(songs) => songs,
            None => {
                debug!("[曲库] 搜索 '{}' 无结果", keyword);
                return Ok(Vec::new());
            }
        };
        let tracks: Vec<TrackDescriptor> = songs
            .iter()
            .filter_map(TrackDescriptor::from_raw_json)
            .collect();
        debug!("[曲库] 搜索 '{}' 得到 {} 条候选", keyword, tracks.len());
        Ok(tracks)
    }

    async fn song_detail(&self, id: u64) -> Result<Option<TrackDescriptor>> {
        let url = format!("{}/song/detail/?id={}&ids=[{}]", API_BASE, id, id);

        debug!("[曲库] 获取歌曲详情: id {}", id);
        let json = self
            .request_json(self.client.get(&url), "歌曲详情")
            .await?;
        Ok(json
            .pointer("/songs/0")
            .and_then(TrackDescriptor::from_raw_json))
    }
}

#[async_trait]
impl LyricSource for NeteaseClient {
    async fn fetch_lyric(&self, id: u64) -> Result<RawLyric> {
        let url = format!(
            "{}/song/lyric?id={}&cp=false&lv=0&kv=0&tv=0&rv=0&yv=0&ytv=0&yrv=0",
            API_BASE, id
        );

        debug!("[曲库] 获取歌词: id {}", id);
        let json = self.request_json(self.client.get(&url), "歌词").await?;

        let take = |key: &str| {
            json.pointer(&format!("/{}/lyric", key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let mut yrc = take("yrc");
        if yrc.is_empty() {
            // 旧版接口把逐字歌词放在 klyric 字段
            yrc = take("klyric");
        }
        Ok(RawLyric {
            lrc: take("lrc"),
            tlyric: take("tlyric"),
            romalrc: take("romalrc"),
            yrc,
        })
    }
}
