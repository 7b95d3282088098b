use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// 监控与解析参数
    pub monitor: MonitorConfig,

    /// HTTP 状态接口设置
    pub server: ServerConfig,

    /// 目标客户端信号源设置
    pub source: SourceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    /// 轮询周期（毫秒）
    pub poll_interval_ms: u64,

    /// 目标进程不可达时的重连退避（毫秒）
    pub reconnect_interval_ms: u64,

    /// 窗口标题检查节流间隔（毫秒）
    pub title_poll_interval_ms: u64,

    /// 判定切歌的总时长跳变阈值（秒）
    pub duration_jump_secs: f64,

    /// 疑似切歌后的去抖等待（毫秒）
    pub debounce_ms: u64,

    /// 解析重试次数上限
    pub resolve_max_attempts: u32,

    /// 解析重试间隔（毫秒）
    pub resolve_retry_interval_ms: u64,

    /// 候选曲目的时长容差（毫秒）
    pub duration_tolerance_ms: u64,

    /// 重试耗尽后是否强制采用时长超差的候选
    pub force_accept_out_of_tolerance: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// 是否启动 HTTP 状态接口
    pub enabled: bool,

    /// 监听地址
    pub host: String,

    /// 监听端口
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    /// 目标进程名
    pub process_name: String,

    /// 读取内存用的模块名
    pub module_name: String,

    /// 播放窗口的窗口类名
    pub window_class: String,

    /// 窗口标题中需要剥离的应用名后缀
    pub window_title_suffix: String,

    /// 不参与识别的窗口标题（桌面歌词等辅助窗口）
    pub window_title_blacklist: Vec<String>,

    /// 本地曲库数据库路径，缺省时按客户端默认安装位置推导
    pub db_path: Option<PathBuf>,

    /// 云端搜索返回的候选数量
    pub search_limit: u32,

    /// 网络请求超时（秒）
    pub request_timeout_secs: u64,

    /// 播放进度（已播放秒数）的模块内偏移
    pub elapsed_offset: u64,

    /// 总时长的模块内偏移
    pub total_offset: u64,

    /// 曲目标识指针链的静态入口偏移
    pub identity_entry_offset: u64,

    /// 曲目标识指针链的逐级偏移，末级指向标识字符串
    pub identity_chain: Vec<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            poll_interval_ms: 100,
            reconnect_interval_ms: 2000,
            title_poll_interval_ms: 500,
            duration_jump_secs: 1.0,
            debounce_ms: 1200,
            resolve_max_attempts: 6,
            resolve_retry_interval_ms: 500,
            duration_tolerance_ms: 3000,
            force_accept_out_of_tolerance: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 18726,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            process_name: "cloudmusic.exe".to_string(),
            module_name: "cloudmusic.dll".to_string(),
            window_class: "OrpheusBrowserHost".to_string(),
            window_title_suffix: " - 网易云音乐".to_string(),
            window_title_blacklist: ["网易云音乐", "桌面歌词", "精简模式", "Mini模式"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            db_path: None,
            search_limit: 10,
            request_timeout_secs: 5,
            // 内存偏移随客户端版本变动，放配置里便于更新后修正
            elapsed_offset: 0x1D7E8F8,
            total_offset: 0x1DDEF58,
            identity_entry_offset: 0x1DDE250,
            identity_chain: vec![0x10, 0x0, 0x10, 0x68, 0x0],
        }
    }
}

impl Config {
    /// 加载配置，支持从指定路径或默认路径加载
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let pkg_name = env!("CARGO_PKG_NAME");
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(|| {
            dirs::config_dir()
                .map(|p| p.join(pkg_name).join("config.toml"))
                .unwrap_or_else(|| PathBuf::from(format!("{}-config.toml", pkg_name)))
        });

        debug!("尝试从 {:?} 加载配置文件", config_path);

        if !config_path.exists() {
            debug!("配置文件 {:?} 不存在，将创建默认配置", config_path);
            let default_config = Config::default();
            let toml = toml::to_string_pretty(&default_config)?;

            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(&config_path, toml)?;
            info!("已创建默认配置文件: {:?}", config_path);
            return Ok(default_config);
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = match toml::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("解析配置文件 {:?} 失败: {}", config_path, e);
                warn!("由于解析错误，将加载默认配置");
                Config::default()
            }
        };

        debug!("已成功加载配置文件");
        Ok(config)
    }
}
