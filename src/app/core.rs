use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{Config, SourceConfig};
use crate::lyrics::LyricService;
use crate::monitor::{MonitorEngine, Reconciler};
use crate::server::{self, ApiContext};
use crate::source::netease::NeteaseClient;
use crate::source::webdb::WebDb;
use crate::source::{IdentitySource, PositionSource, TitleSource};
use crate::state::SnapshotStore;
use crate::track::TrackResolver;

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        App { config }
    }

    /// 组装全部组件并运行，直到收到退出信号
    pub async fn run(self) -> Result<()> {
        let cfg = self.config;

        let snapshot = SnapshotStore::new();

        let db_path = cfg
            .source
            .db_path
            .clone()
            .or_else(WebDb::default_path)
            .context("无法确定本地曲库路径，请在配置中指定 source.db_path")?;
        info!("[应用] 本地曲库: {}", db_path.display());
        let store = Arc::new(WebDb::new(db_path));

        let netease = Arc::new(NeteaseClient::new(
            cfg.source.search_limit,
            cfg.source.request_timeout_secs,
        )?);

        let lyrics = LyricService::new(netease.clone(), snapshot.clone());
        let resolver = TrackResolver::new(
            store.clone(),
            netease,
            cfg.monitor.duration_tolerance_ms,
        );
        let reconciler = Reconciler::new(
            cfg.monitor.clone(),
            cfg.source.window_title_suffix.clone(),
            resolver,
            lyrics.clone(),
        );

        let (position, identity, title) = native_sources(&cfg.source)?;
        let engine = MonitorEngine::new(
            cfg.monitor.clone(),
            position,
            identity,
            title,
            reconciler,
            lyrics.clone(),
            snapshot.clone(),
        );
        let monitor_handle = tokio::spawn(engine.run());

        let server_handle = if cfg.server.enabled {
            let ctx = ApiContext {
                snapshot,
                lyrics,
                store,
            };
            Some(tokio::spawn(server::run(cfg.server.clone(), ctx)))
        } else {
            info!("[应用] HTTP 状态接口已禁用");
            None
        };

        wait_for_shutdown(monitor_handle, server_handle).await
    }
}

/// 等待退出信号或某个常驻任务意外终止
async fn wait_for_shutdown(
    monitor: JoinHandle<()>,
    server: Option<JoinHandle<Result<()>>>,
) -> Result<()> {
    let server_task = async {
        match server {
            Some(handle) => handle.await,
            // 服务未启用时挂起，只等其余分支
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("[应用] 收到退出信号，正在关闭");
            Ok(())
        }
        result = monitor => {
            error!("[应用] 监控任务意外退出");
            result.map_err(Into::into)
        }
        result = server_task => match result {
            Ok(inner) => inner,
            Err(e) => Err(e.into()),
        },
    }
}

#[cfg(windows)]
fn native_sources(
    cfg: &SourceConfig,
) -> Result<(
    Box<dyn PositionSource>,
    Option<Box<dyn IdentitySource>>,
    Box<dyn TitleSource>,
)> {
    use crate::source::windows::{MemoryIdentityReader, MemoryPositionReader, WindowTitleReader};

    // 身份指针链随客户端版本失效时可把入口偏移置 0 关掉，退回弱信号路径
    let identity: Option<Box<dyn IdentitySource>> = if cfg.identity_entry_offset == 0 {
        info!("[应用] 身份信号源未配置，只用弱信号侦测换歌");
        None
    } else {
        Some(Box::new(MemoryIdentityReader::new(cfg.clone())))
    };
    Ok((
        Box::new(MemoryPositionReader::new(cfg.clone())),
        identity,
        Box::new(WindowTitleReader::new(cfg.clone())),
    ))
}

#[cfg(not(windows))]
fn native_sources(
    _cfg: &SourceConfig,
) -> Result<(
    Box<dyn PositionSource>,
    Option<Box<dyn IdentitySource>>,
    Box<dyn TitleSource>,
)> {
    anyhow::bail!("原生信号源只有 Windows 实现，目标客户端也只在 Windows 上运行")
}
