// 应用核心库

// 模块导出
pub mod app;
pub mod config;
pub mod lyrics;
pub mod monitor;
pub mod server;
pub mod source;
pub mod state;
pub mod track;
pub mod utils;
