// 仅在 Windows 上编译的原生信号源：
// 进程内存直读进度与身份串，窗口枚举取标题。

mod process;
mod window;

pub use process::{MemoryIdentityReader, MemoryPositionReader};
pub use window::WindowTitleReader;
