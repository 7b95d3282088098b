use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ncm_nowplaying_rs::app::App;
use ncm_nowplaying_rs::config::Config;

/// 网易云音乐播放状态监控与歌词同步服务
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// 配置文件路径，缺省时使用系统配置目录
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖配置中的 HTTP 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别，RUST_LOG 环境变量优先
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("{} v{} 启动", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    App::new(config).run().await
}
