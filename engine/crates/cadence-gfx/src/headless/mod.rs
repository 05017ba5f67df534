//! Headless 软件后端
//!
//! 命令在提交时于 CPU 上执行：clear 与 blit 会真正写入像素，draw / dispatch 只计数。
//! 每次 layout 转换都会与 image 的当前 layout 比对，不匹配的情况记录为 validation error，
//! attachment 与 blit 的写入会一直挂在 image 上，直到某个 barrier 或 pass dependency 的
//! src stage / access 覆盖它；后续使用时没有被覆盖同样记录为 validation error。
//! 测试可以借此断言帧图生成的 barrier 是正确的。

mod command_list;
mod device;
mod state;

pub use command_list::HeadlessCommandList;
pub use device::HeadlessDevice;
pub use state::HeadlessCommand;
