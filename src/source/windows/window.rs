use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
};

use super::process::find_process_id;
use crate::config::SourceConfig;
use crate::source::TitleSource;
use crate::utils::title::pick_playing_title;

/// 枚举目标进程指定窗口类的可见顶层窗口，挑出正在播放的标题
pub struct WindowTitleReader {
    cfg: SourceConfig,
    pid: Option<u32>,
}

impl WindowTitleReader {
    pub fn new(cfg: SourceConfig) -> Self {
        WindowTitleReader { cfg, pid: None }
    }
}

impl TitleSource for WindowTitleReader {
    fn read_title(&mut self) -> Option<String> {
        if self.pid.is_none() {
            self.pid = find_process_id(&self.cfg.process_name);
        }
        let pid = self.pid?;

        let titles = collect_titles(pid, &self.cfg.window_class);
        if titles.is_empty() {
            // 一个窗口都枚举不到，进程可能已退出，作废缓存的 pid
            self.pid = None;
            return None;
        }
        pick_playing_title(&titles, &self.cfg.window_title_blacklist)
    }
}

struct EnumContext<'a> {
    pid: u32,
    class: &'a str,
    titles: Vec<String>,
}

fn collect_titles(pid: u32, class: &str) -> Vec<String> {
    let mut ctx = EnumContext {
        pid,
        class,
        titles: Vec::new(),
    };
    unsafe {
        let _ = EnumWindows(
            Some(enum_callback),
            LPARAM(&mut ctx as *mut EnumContext as isize),
        );
    }
    ctx.titles
}

unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let ctx = &mut *(lparam.0 as *mut EnumContext);

    if !IsWindowVisible(hwnd).as_bool() {
        return BOOL::from(true);
    }

    let mut wnd_pid = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut wnd_pid));
    if wnd_pid != ctx.pid {
        return BOOL::from(true);
    }

    let mut class_buf = [0u16; 128];
    let len = GetClassNameW(hwnd, &mut class_buf);
    if len <= 0 || String::from_utf16_lossy(&class_buf[..len as usize]) != ctx.class {
        return BOOL::from(true);
    }

    let mut text_buf = [0u16; 256];
    let len = GetWindowTextW(hwnd, &mut text_buf);
    if len > 0 {
        ctx.titles
            .push(String::from_utf16_lossy(&text_buf[..len as usize]));
    }
    BOOL::from(true)
}
