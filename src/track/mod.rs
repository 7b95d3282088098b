mod resolver;

pub use resolver::{Resolution, TrackResolver, TrackSignal};

use serde::Serialize;
use serde_json::Value;

/// 规范化后的曲目描述。
/// 上游各接口字段命名不一致，统一经 from_raw_json 抹平后才进入引擎。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackDescriptor {
    pub id: u64,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub cover_url: String,
    pub duration_ms: u64,
}

impl TrackDescriptor {
    /// 歌手展示字符串，以 " / " 连接
    pub fn artist_display(&self) -> String {
        self.artists.join(" / ")
    }

    /// 形如 "歌名 - 歌手A/歌手B" 的标题，与播放窗口标题同构，
    /// 用作检测标题漂移的基准
    pub fn expected_title(&self) -> String {
        if self.artists.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.artists.join("/"))
        }
    }

    /// 从上游 JSON 构造曲目描述。
    ///
    /// 搜索接口返回 ar/al/dt，详情接口与本地库返回 artists/album/duration，
    /// 本地库记录还可能整体包在 "track" 字段里。时长缺失或为 0 视为无效记录。
    pub fn from_raw_json(value: &Value) -> Option<TrackDescriptor> {
        let value = value.get("track").unwrap_or(value);

        let id = value.get("id").and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })?;

        let duration_ms = value
            .get("duration")
            .or_else(|| value.get("dt"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if duration_ms == 0 {
            return None;
        }

        let title = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let artists = value
            .get("artists")
            .or_else(|| value.get("ar"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let album_value = value.get("album").or_else(|| value.get("al"));
        let album = album_value
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let cover_url = album_value
            .and_then(|a| a.get("picUrl"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(TrackDescriptor {
            id,
            title,
            artists,
            album,
            cover_url,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_search_dialect() {
        // 搜索接口的缩写字段
        let value = json!({
            "id": 186016,
            "name": "夜曲",
            "ar": [{"name": "周杰伦"}],
            "al": {"name": "十一月的萧邦", "picUrl": "http://example.com/cover.jpg"},
            "dt": 225000
        });
        let track = TrackDescriptor::from_raw_json(&value).unwrap();
        assert_eq!(track.id, 186016);
        assert_eq!(track.title, "夜曲");
        assert_eq!(track.artists, vec!["周杰伦"]);
        assert_eq!(track.album, "十一月的萧邦");
        assert_eq!(track.cover_url, "http://example.com/cover.jpg");
        assert_eq!(track.duration_ms, 225000);
    }

    #[test]
    fn test_from_detail_dialect() {
        // 详情接口与本地库的完整字段名
        let value = json!({
            "id": "186016",
            "name": "夜曲",
            "artists": [{"name": "周杰伦"}, {"name": "费玉清"}],
            "album": {"name": "十一月的萧邦"},
            "duration": 225000
        });
        let track = TrackDescriptor::from_raw_json(&value).unwrap();
        assert_eq!(track.id, 186016);
        assert_eq!(track.artists.len(), 2);
        assert_eq!(track.artist_display(), "周杰伦 / 费玉清");
    }

    #[test]
    fn test_from_wrapped_record() {
        // 本地库的历史记录把曲目包在 track 字段里
        let value = json!({
            "track": {"id": 7, "name": "稻香", "ar": [{"name": "周杰伦"}], "dt": 223000},
            "playTime": 1700000000
        });
        let track = TrackDescriptor::from_raw_json(&value).unwrap();
        assert_eq!(track.id, 7);
        assert_eq!(track.title, "稻香");
    }

    #[test]
    fn test_invalid_records_rejected() {
        // 时长缺失或为 0 的记录一律拒绝，未解析状态不允许用零值顶替
        assert!(TrackDescriptor::from_raw_json(&json!({"id": 1, "name": "x"})).is_none());
        assert!(TrackDescriptor::from_raw_json(&json!({"id": 1, "name": "x", "dt": 0})).is_none());
        assert!(TrackDescriptor::from_raw_json(&json!({"name": "x", "dt": 1000})).is_none());
    }

    #[test]
    fn test_expected_title() {
        let track = TrackDescriptor {
            id: 1,
            title: "夜曲".to_string(),
            artists: vec!["周杰伦".to_string(), "费玉清".to_string()],
            album: String::new(),
            cover_url: String::new(),
            duration_ms: 225000,
        };
        assert_eq!(track.expected_title(), "夜曲 - 周杰伦/费玉清");
    }
}
