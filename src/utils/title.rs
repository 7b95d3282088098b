use crate::track::TrackDescriptor;

/// 清洗窗口标题：剥离应用名后缀并去掉首尾空白
pub fn clean_window_title(raw: &str, suffix: &str) -> String {
    let trimmed = raw.trim();
    let stripped = if !suffix.is_empty() {
        trimmed.strip_suffix(suffix).unwrap_or(trimmed)
    } else {
        trimmed
    };
    stripped.trim().to_string()
}

/// 从一组候选窗口标题中挑出最像"正在播放"的那个：
/// 跳过黑名单标题，优先返回带 " - " 分隔符的，否则取第一个非空标题
pub fn pick_playing_title(titles: &[String], blacklist: &[String]) -> Option<String> {
    let mut first: Option<&String> = None;
    for title in titles {
        let title_trimmed = title.trim();
        if title_trimmed.is_empty() || blacklist.iter().any(|b| b == title_trimmed) {
            continue;
        }
        if title_trimmed.contains(" - ") {
            return Some(title_trimmed.to_string());
        }
        if first.is_none() {
            first = Some(title);
        }
    }
    first.map(|t| t.trim().to_string())
}

/// 从清洗后的窗口标题解析出的歌名与歌手
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTitle {
    /// 歌名
    pub song: String,
    /// 歌手列表，已统一为小写
    pub artists: Vec<String>,
}

impl ParsedTitle {
    /// 按最后一个 " - " 拆出歌名与歌手段，歌手段再按 "/" 拆分。
    /// 歌名本身可能含 " - "，所以必须从右侧找分隔符。
    pub fn parse(text: &str) -> Self {
        match text.rsplit_once(" - ") {
            Some((song, artist_part)) => {
                let artists = artist_part
                    .split('/')
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect();
                ParsedTitle {
                    song: song.trim().to_string(),
                    artists,
                }
            }
            None => ParsedTitle {
                song: text.trim().to_string(),
                artists: Vec::new(),
            },
        }
    }

    /// 搜索关键字。多歌手时只带第一个，降低多人合作曲目的误报
    pub fn keyword(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} {}", self.song, artist),
            None => self.song.clone(),
        }
    }

    /// 候选是否文本匹配：歌名与歌手都要求双向包含（大小写不敏感）
    pub fn matches(&self, candidate: &TrackDescriptor) -> bool {
        let target = self.song.to_lowercase();
        let cand = candidate.title.to_lowercase();
        if target.is_empty() || cand.is_empty() {
            return false;
        }
        let name_ok = cand.contains(&target) || target.contains(&cand);
        if !name_ok {
            return false;
        }

        if self.artists.is_empty() {
            return true;
        }
        candidate.artists.iter().any(|cand_artist| {
            let cand_artist = cand_artist.to_lowercase();
            !cand_artist.is_empty()
                && self
                    .artists
                    .iter()
                    .any(|target_artist| {
                        target_artist.contains(&cand_artist) || cand_artist.contains(target_artist)
                    })
        })
    }
}
