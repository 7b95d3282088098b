use anyhow::Result;
use regex::Regex;

/// 解析 LRC 格式歌词，返回按时间升序排列的 (毫秒, 文本) 列表。
///
/// 支持 [mm:ss]、[mm:ss.xx]、[mm:ss:xx] 等时间标签以及一行多个标签；
/// 纯元数据行（[ar:...] 等）与空文本行会被跳过。
pub fn parse_lrc(content: &str) -> Result<Vec<(u64, String)>> {
    let mut entries = Vec::new();

    // 匹配时间标签: 分与秒各两位，小数部分 1-3 位，分隔符兼容 . 和 :
    let time_regex = Regex::new(r"\[(\d{2,3}):(\d{2})(?:[.:](\d{1,3}))?\]")?;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut timestamps = Vec::new();
        let mut text_start = 0usize;

        for cap in time_regex.captures_iter(line) {
            let mins = cap[1].parse::<u64>()?;
            let secs = cap[2].parse::<u64>()?;
            let millis = match cap.get(3) {
                None => 0,
                Some(frac) => {
                    // 小数位数不定，需要补齐到毫秒
                    let frac = frac.as_str();
                    let value = frac.parse::<u64>()?;
                    match frac.len() {
                        1 => value * 100,
                        2 => value * 10,
                        _ => value,
                    }
                }
            };
            timestamps.push(mins * 60 * 1000 + secs * 1000 + millis);

            // 歌词文本从最后一个时间标签之后开始
            let tag_end = cap.get(0).unwrap().end();
            if tag_end > text_start {
                text_start = tag_end;
            }
        }

        if timestamps.is_empty() {
            continue;
        }

        let text = line[text_start..].trim();
        if text.is_empty() {
            continue;
        }

        for timestamp in timestamps {
            entries.push((timestamp, text.to_string()));
        }
    }

    entries.sort_by_key(|&(time, _)| time);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let content = r#"[ar:周杰伦]
[ti:稻香]
[00:00.00]周杰伦 - 稻香
[00:09.86]对这个世界如果你有太多的抱怨
[00:13.96]跌倒了就不敢继续往前走"#;

        let entries = parse_lrc(content).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], (0, "周杰伦 - 稻香".to_string()));
        assert_eq!(entries[1].0, 9860);
        assert_eq!(entries[2].0, 13960);
    }

    #[test]
    fn test_parse_fraction_variants() {
        let entries = parse_lrc("[00:10.5]一\n[00:11.52]二\n[00:12.521]三\n[00:13]四\n[00:14:30]五").unwrap();
        assert_eq!(entries[0].0, 10500);
        assert_eq!(entries[1].0, 11520);
        assert_eq!(entries[2].0, 12521);
        assert_eq!(entries[3].0, 13000);
        // 冒号分隔的百分秒写法
        assert_eq!(entries[4].0, 14300);
    }

    #[test]
    fn test_parse_multiple_tags_per_line() {
        let entries = parse_lrc("[00:10.00][01:10.00]重复的副歌").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (10000, "重复的副歌".to_string()));
        assert_eq!(entries[1], (70000, "重复的副歌".to_string()));
    }

    #[test]
    fn test_parse_skips_empty_text() {
        let entries = parse_lrc("[00:10.00]\n[00:20.00]有词").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, 20000);
    }

    #[test]
    fn test_parse_output_sorted() {
        let entries = parse_lrc("[01:00.00]后\n[00:30.00]前").unwrap();
        assert_eq!(entries[0].1, "前");
        assert_eq!(entries[1].1, "后");
    }

    #[test]
    fn test_parse_garbage_and_metadata_ignored() {
        let entries = parse_lrc("纯文本行\n[by:someone]\n{\"t\":0}\n").unwrap();
        assert!(entries.is_empty());
    }
}
