pub mod lrc;
pub mod title;

/// 把秒数格式化为 MM:SS 时钟串，负数按 0 处理
pub fn format_clock(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}
