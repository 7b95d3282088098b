pub mod netease;
pub mod webdb;
#[cfg(windows)]
pub mod windows;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::lyrics::RawLyric;
use crate::state::PlaybackPosition;
use crate::track::TrackDescriptor;

/// 信号源内部错误。向上层暴露前基本都会降级为"本轮无数据"，
/// 只在日志里保留细节。
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("目标进程未找到: {0}")]
    ProcessNotFound(String),
    #[error("目标模块未找到: {0}")]
    ModuleNotFound(String),
    #[error("内存读取失败: 0x{addr:X}")]
    ReadFailed { addr: u64 },
    #[error("本地库查询失败")]
    Store(#[from] sqlx::Error),
}

/// 播放进度信号。目标不可达是正常结果，用 None 表达
pub trait PositionSource: Send {
    fn read_position(&mut self) -> Option<PlaybackPosition>;
}

/// 强身份信号：当前曲目 id
pub trait IdentitySource: Send {
    fn read_identity(&mut self) -> Option<u64>;
}

/// 窗口标题信号，返回未清洗的原始标题
pub trait TitleSource: Send {
    fn read_title(&mut self) -> Option<String>;
}

/// 本地播放历史库
#[async_trait]
pub trait LocalStoreSource: Send + Sync {
    /// 最近一条播放记录
    async fn latest(&self) -> Option<TrackDescriptor>;
    /// 按曲目 id 精确查找
    async fn find_by_id(&self, id: u64) -> Option<TrackDescriptor>;
    /// 最近 limit 条播放记录，按播放时间倒序
    async fn recent(&self, limit: u32) -> Vec<PlayRecord>;
    /// 自上次调用以来库文件是否有变动
    async fn has_changed(&self) -> bool;
}

/// 在线曲库
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn search(&self, keyword: &str) -> Result<Vec<TrackDescriptor>>;
    async fn song_detail(&self, id: u64) -> Result<Option<TrackDescriptor>>;
}

/// 歌词源
#[async_trait]
pub trait LyricSource: Send + Sync {
    async fn fetch_lyric(&self, id: u64) -> Result<RawLyric>;
}

/// 本地库中的一条播放历史
#[derive(Debug, Clone, Serialize)]
pub struct PlayRecord {
    /// 库内原始播放时间戳
    pub playtime: i64,
    pub track: TrackDescriptor,
}

/// 从内存身份串解析曲目 id。
/// 串的形态是 "<id>_<毫秒时间戳>"，只取下划线前的 id 段。
pub fn parse_identity_token(raw: &str) -> Option<u64> {
    let id_part = raw.trim().split('_').next()?;
    let id: u64 = id_part.parse().ok()?;
    if id == 0 {
        return None;
    }
    Some(id)
}
