//! Cadence GFX 边界
//!
//! 帧图核心只通过这里定义的接口与 GPU 打交道：
//!
//! - [`GfxDevice`]：资源生命周期与队列提交
//! - [`GfxCommandList`]：命令录制表面，核心从不检查命令内容
//!
//! 同时提供两个实现：
//!
//! - [`headless`]：在 CPU 上执行命令的软件后端，会像 validation layer 一样检查 image layout，
//!   用于测试与离线工具
//! - `vulkan`（feature `vulkan`）：基于 ash + vk-mem 的实现

pub mod commands;
pub mod device;
pub mod error;
pub mod handles;
pub mod headless;
pub mod resources;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use ash::vk;

pub use commands::barrier::GfxImageBarrier;
pub use commands::blit::GfxImageBlit;
pub use commands::pass::{GfxAttachmentInfo, GfxClearValue, GfxPassBeginInfo, GfxPassDependency};
pub use commands::submit_info::{GfxSemaphoreInfo, GfxSubmitInfo};
pub use device::{GfxCommandList, GfxDevice, LabelColor};
pub use error::{GfxError, GfxResult};
pub use handles::ImageHandle;
pub use resources::image::{GfxFormatUtils, GfxImageCreateInfo};
pub use resources::sampler::GfxSamplerDesc;
