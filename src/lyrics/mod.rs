mod service;

pub use service::LyricService;

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::utils::lrc::parse_lrc;

/// 一行歌词：时间戳 + 原文 + 译文
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricEntry {
    pub time_ms: u64,
    pub text: String,
    pub translation: String,
}

/// 按时间排好序的歌词时间轴
#[derive(Debug, Clone, Default)]
pub struct LyricTimeline {
    entries: Vec<LyricEntry>,
}

impl LyricTimeline {
    /// 解析原文与译文并按时间戳合并。
    /// 同一时间戳出现多行时保留第一行；没有对应原文的译文行丢弃。
    pub fn build(lrc: &str, tlyric: &str) -> Result<LyricTimeline> {
        let mut merged: BTreeMap<u64, LyricEntry> = BTreeMap::new();

        for (time_ms, text) in parse_lrc(lrc)? {
            merged.entry(time_ms).or_insert(LyricEntry {
                time_ms,
                text,
                translation: String::new(),
            });
        }
        for (time_ms, text) in parse_lrc(tlyric)? {
            if let Some(entry) = merged.get_mut(&time_ms) {
                if entry.translation.is_empty() {
                    entry.translation = text;
                }
            }
        }

        Ok(LyricTimeline {
            entries: merged.into_values().collect(),
        })
    }

    /// 返回时间戳不超过 elapsed 的最后一行。
    /// 线性扫描，行数最多几百、每秒查询几次，没必要上二分。
    pub fn line_at(&self, elapsed_secs: f64) -> Option<&LyricEntry> {
        let elapsed_ms = (elapsed_secs * 1000.0) as i64;
        let mut current = None;
        for entry in &self.entries {
            if entry.time_ms as i64 <= elapsed_ms {
                current = Some(entry);
            } else {
                break;
            }
        }
        current
    }

    pub fn entries(&self) -> &[LyricEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 上游返回的原始歌词文本，四种变体各自可能为空
#[derive(Debug, Clone, Default)]
pub struct RawLyric {
    pub lrc: String,
    pub tlyric: String,
    pub romalrc: String,
    pub yrc: String,
}

/// 完整歌词负载，带各变体的可用性标记
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricPacket {
    pub id: u64,
    pub has_lyric: bool,
    pub has_trans: bool,
    pub has_roma: bool,
    pub has_yrc: bool,
    pub lrc: String,
    pub tlyric: String,
    pub romalrc: String,
    pub yrc: String,
}

impl LyricPacket {
    pub fn from_raw(id: u64, raw: &RawLyric) -> LyricPacket {
        LyricPacket {
            id,
            has_lyric: !raw.lrc.trim().is_empty(),
            has_trans: !raw.tlyric.trim().is_empty(),
            has_roma: !raw.romalrc.trim().is_empty(),
            has_yrc: !raw.yrc.trim().is_empty(),
            lrc: raw.lrc.clone(),
            tlyric: raw.tlyric.clone(),
            romalrc: raw.romalrc.clone(),
            yrc: raw.yrc.clone(),
        }
    }
}
