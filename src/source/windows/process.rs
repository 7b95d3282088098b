use std::ffi::c_void;

use tracing::debug;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, Process32FirstW, Process32NextW,
    MODULEENTRY32W, PROCESSENTRY32W, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};

use crate::config::SourceConfig;
use crate::source::{parse_identity_token, IdentitySource, PositionSource, SourceError};
use crate::state::PlaybackPosition;

/// 已附加的目标进程：打开的句柄 + 主模块基址。
/// 目标退出后所有读取都会失败，届时整体丢弃等下个周期重新附加。
struct ProcessAttachment {
    handle: HANDLE,
    module_base: u64,
}

// 句柄只是内核对象的编号，跨线程携带是安全的
unsafe impl Send for ProcessAttachment {}

impl ProcessAttachment {
    fn open(process_name: &str, module_name: &str) -> Result<ProcessAttachment, SourceError> {
        let pid = find_process_id(process_name)
            .ok_or_else(|| SourceError::ProcessNotFound(process_name.to_string()))?;
        let module_base = find_module_base(pid, module_name)
            .ok_or_else(|| SourceError::ModuleNotFound(module_name.to_string()))?;
        let handle =
            unsafe { OpenProcess(PROCESS_VM_READ | PROCESS_QUERY_INFORMATION, false, pid) }
                .map_err(|_| SourceError::ProcessNotFound(process_name.to_string()))?;
        debug!(
            "[信号源] 已附加进程 {} (pid {})，模块基址 0x{:X}",
            process_name, pid, module_base
        );
        Ok(ProcessAttachment {
            handle,
            module_base,
        })
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        let mut read = 0usize;
        unsafe {
            ReadProcessMemory(
                self.handle,
                addr as *const c_void,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                Some(&mut read),
            )
        }
        .map_err(|_| SourceError::ReadFailed { addr })?;
        if read != buf.len() {
            return Err(SourceError::ReadFailed { addr });
        }
        Ok(())
    }

    fn read_f64(&self, addr: u64) -> Result<f64, SourceError> {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    fn read_u64(&self, addr: u64) -> Result<u64, SourceError> {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl Drop for ProcessAttachment {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

pub(super) fn find_process_id(process_name: &str) -> Option<u32> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }.ok()?;
    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };
    let mut found = None;
    if unsafe { Process32FirstW(snapshot, &mut entry) }.is_ok() {
        loop {
            if utf16_until_nul(&entry.szExeFile).eq_ignore_ascii_case(process_name) {
                found = Some(entry.th32ProcessID);
                break;
            }
            if unsafe { Process32NextW(snapshot, &mut entry) }.is_err() {
                break;
            }
        }
    }
    unsafe {
        let _ = CloseHandle(snapshot);
    }
    found
}

fn find_module_base(pid: u32, module_name: &str) -> Option<u64> {
    let snapshot =
        unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }.ok()?;
    let mut entry = MODULEENTRY32W {
        dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };
    let mut found = None;
    if unsafe { Module32FirstW(snapshot, &mut entry) }.is_ok() {
        loop {
            if utf16_until_nul(&entry.szModule).eq_ignore_ascii_case(module_name) {
                found = Some(entry.modBaseAddr as u64);
                break;
            }
            if unsafe { Module32NextW(snapshot, &mut entry) }.is_err() {
                break;
            }
        }
    }
    unsafe {
        let _ = CloseHandle(snapshot);
    }
    found
}

fn utf16_until_nul(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// 从目标进程内存直读播放进度
pub struct MemoryPositionReader {
    cfg: SourceConfig,
    attachment: Option<ProcessAttachment>,
}

impl MemoryPositionReader {
    pub fn new(cfg: SourceConfig) -> Self {
        MemoryPositionReader {
            cfg,
            attachment: None,
        }
    }
}

impl PositionSource for MemoryPositionReader {
    fn read_position(&mut self) -> Option<PlaybackPosition> {
        let elapsed_offset = self.cfg.elapsed_offset;
        let total_offset = self.cfg.total_offset;
        let att = attach(&mut self.attachment, &self.cfg)?;
        let result = att
            .read_f64(att.module_base + elapsed_offset)
            .and_then(|elapsed| {
                att.read_f64(att.module_base + total_offset)
                    .map(|total| PlaybackPosition::new(elapsed, total))
            });
        match result {
            Ok(position) => Some(position),
            Err(e) => {
                // 读失败多半是进程刚退出，丢弃句柄待重新附加
                debug!("[信号源] 读取进度失败: {}", e);
                self.attachment = None;
                None
            }
        }
    }
}

/// 沿静态指针链读出身份串
pub struct MemoryIdentityReader {
    cfg: SourceConfig,
    attachment: Option<ProcessAttachment>,
}

impl MemoryIdentityReader {
    pub fn new(cfg: SourceConfig) -> Self {
        MemoryIdentityReader {
            cfg,
            attachment: None,
        }
    }
}

impl IdentitySource for MemoryIdentityReader {
    fn read_identity(&mut self) -> Option<u64> {
        let entry_offset = self.cfg.identity_entry_offset;
        let chain = self.cfg.identity_chain.clone();
        let att = attach(&mut self.attachment, &self.cfg)?;
        match read_identity_string(att, entry_offset, &chain) {
            Ok(raw) => parse_identity_token(&raw),
            Err(e) => {
                debug!("[信号源] 读取身份串失败: {}", e);
                self.attachment = None;
                None
            }
        }
    }
}

fn attach<'a>(
    slot: &'a mut Option<ProcessAttachment>,
    cfg: &SourceConfig,
) -> Option<&'a ProcessAttachment> {
    if slot.is_none() {
        match ProcessAttachment::open(&cfg.process_name, &cfg.module_name) {
            Ok(att) => *slot = Some(att),
            Err(e) => {
                debug!("[信号源] 附加进程失败: {}", e);
                return None;
            }
        }
    }
    slot.as_ref()
}

/// 指针链读取：入口是模块内静态地址，前面每一跳都是"解引用再加偏移"，
/// 最后一跳落在身份串本体上
fn read_identity_string(
    att: &ProcessAttachment,
    entry_offset: u64,
    chain: &[u64],
) -> Result<String, SourceError> {
    let mut addr = att.read_u64(att.module_base + entry_offset)?;
    if let Some((last, hops)) = chain.split_last() {
        for hop in hops {
            addr = att.read_u64(addr + hop)?;
        }
        addr += last;
    }
    let mut buf = [0u8; 64];
    att.read_bytes(addr, &mut buf)?;
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}
