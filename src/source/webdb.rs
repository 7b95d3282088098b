use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use tracing::debug;

use crate::source::{LocalStoreSource, PlayRecord, SourceError};
use crate::track::TrackDescriptor;

/// find_by_id 的扫描深度
const SCAN_LIMIT: i64 = 100;

/// 目标播放器的本地历史库（SQLite）。
/// 库文件由外部进程持续写入，这里每次查询都开短命只读连接，
/// 拿不到锁或文件被换掉时降级为"本轮无数据"。
pub struct WebDb {
    path: PathBuf,
    last_mtime: Mutex<Option<SystemTime>>,
}

impl WebDb {
    pub fn new(path: PathBuf) -> Self {
        WebDb {
            path,
            last_mtime: Mutex::new(None),
        }
    }

    /// 播放器默认的库文件位置
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| {
            dir.join("NetEase")
                .join("CloudMusic")
                .join("Library")
                .join("webdb.dat")
        })
    }

    async fn connect(&self) -> Result<SqliteConnection, SourceError> {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true)
            .busy_timeout(Duration::from_millis(250));
        Ok(options.connect().await?)
    }

    async fn query_latest(&self) -> Result<Option<TrackDescriptor>, SourceError> {
        let mut conn = self.connect().await?;
        let row: Option<String> =
            sqlx::query_scalar("SELECT jsonStr FROM historyTracks ORDER BY playtime DESC LIMIT 1")
                .fetch_optional(&mut conn)
                .await?;
        Ok(row.as_deref().and_then(parse_track))
    }

    /// id 埋在 jsonStr 里且包装层级不定，扫描最近若干条代替 json 提取
    async fn query_by_id(&self, id: u64) -> Result<Option<TrackDescriptor>, SourceError> {
        let mut conn = self.connect().await?;
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT jsonStr FROM historyTracks ORDER BY playtime DESC LIMIT ?")
                .bind(SCAN_LIMIT)
                .fetch_all(&mut conn)
                .await?;
        Ok(rows
            .iter()
            .filter_map(|json| parse_track(json))
            .find(|track| track.id == id))
    }

    async fn query_recent(&self, limit: u32) -> Result<Vec<PlayRecord>, SourceError> {
        let mut conn = self.connect().await?;
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT playtime, jsonStr FROM historyTracks ORDER BY playtime DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&mut conn)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(playtime, json)| {
                parse_track(&json).map(|track| PlayRecord { playtime, track })
            })
            .collect())
    }

    /// 库文件与 -wal 伴生文件里较新的修改时间
    fn current_mtime(&self) -> Option<SystemTime> {
        let base = file_mtime(&self.path);
        let wal = file_mtime(&wal_path(&self.path));
        match (base, wal) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[async_trait]
impl LocalStoreSource for WebDb {
    async fn latest(&self) -> Option<TrackDescriptor> {
        match self.query_latest().await {
            Ok(track) => track,
            Err(e) => {
                debug!("[本地库] 读取最近记录失败: {}", e);
                None
            }
        }
    }

    async fn find_by_id(&self, id: u64) -> Option<TrackDescriptor> {
        match self.query_by_id(id).await {
            Ok(track) => track,
            Err(e) => {
                debug!("[本地库] 按 id 查找失败: {}", e);
                None
            }
        }
    }

    async fn recent(&self, limit: u32) -> Vec<PlayRecord> {
        match self.query_recent(limit).await {
            Ok(records) => records,
            Err(e) => {
                debug!("[本地库] 读取播放历史失败: {}", e);
                Vec::new()
            }
        }
    }

    async fn has_changed(&self) -> bool {
        let current = self.current_mtime();
        let mut last = self.last_mtime.lock().unwrap();
        match (current, *last) {
            (Some(now), Some(prev)) if now == prev => false,
            // 文件一直不存在就没有可读的东西
            (None, None) => false,
            (current, _) => {
                *last = current;
                true
            }
        }
    }
}

fn parse_track(json: &str) -> Option<TrackDescriptor> {
    let value: Value = serde_json::from_str(json).ok()?;
    TrackDescriptor::from_raw_json(&value)
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

fn wal_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push("-wal");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NIGHT_SONG: &str = r#"{"id":186016,"name":"夜曲","artists":[{"name":"周杰伦"}],"album":{"name":"十一月的萧邦"},"duration":225000}"#;
    const WRAPPED_SONG: &str =
        r#"{"track":{"id":7,"name":"稻香","ar":[{"name":"周杰伦"}],"dt":223000},"playTime":1700000000}"#;

    async fn seed_db(path: &Path, rows: &[(i64, &str)]) {
        let mut conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE historyTracks (id INTEGER PRIMARY KEY AUTOINCREMENT, jsonStr TEXT, playtime INTEGER)",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        for (playtime, json) in rows {
            sqlx::query("INSERT INTO historyTracks (jsonStr, playtime) VALUES (?, ?)")
                .bind(json)
                .bind(playtime)
                .execute(&mut conn)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_latest_and_find_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webdb.dat");
        seed_db(&path, &[(100, NIGHT_SONG), (200, WRAPPED_SONG)]).await;

        let db = WebDb::new(path);
        // playtime 更大的记录才是最近播放
        let latest = db.latest().await.unwrap();
        assert_eq!(latest.id, 7);
        assert_eq!(latest.title, "稻香");

        let found = db.find_by_id(186016).await.unwrap();
        assert_eq!(found.title, "夜曲");
        assert_eq!(found.duration_ms, 225000);
        assert!(db.find_by_id(999).await.is_none());
    }

    #[tokio::test]
    async fn test_recent_order_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webdb.dat");
        seed_db(&path, &[(100, NIGHT_SONG), (200, WRAPPED_SONG)]).await;

        let db = WebDb::new(path);
        let records = db.recent(10).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].playtime, 200);
        assert_eq!(records[0].track.id, 7);

        assert_eq!(db.recent(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_degrades_to_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let db = WebDb::new(dir.path().join("不存在.dat"));
        assert!(db.latest().await.is_none());
        assert!(db.find_by_id(1).await.is_none());
        assert!(db.recent(5).await.is_empty());
        assert!(!db.has_changed().await);
    }

    #[tokio::test]
    async fn test_has_changed_follows_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webdb.dat");
        seed_db(&path, &[(100, NIGHT_SONG)]).await;

        let db = WebDb::new(path.clone());
        // 首次观察视为有变化，之后文件不动就不再报变
        assert!(db.has_changed().await);
        assert!(!db.has_changed().await);
        assert!(!db.has_changed().await);

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();
        assert!(db.has_changed().await);
        assert!(!db.has_changed().await);
    }
}
