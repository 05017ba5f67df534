use ash::vk;
use thiserror::Error;

/// 后端错误
///
/// 由设备层向上传播，帧图核心不会重试：GPU 工作不是幂等的。
#[derive(Error, Debug)]
pub enum GfxError {
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
    #[error("Failed to create image \"{name}\": {reason}")]
    ImageCreationFailed { name: String, reason: String },
    #[error("Invalid image handle: {0:?}")]
    InvalidImage(crate::handles::ImageHandle),
    #[error("Command list is not recording")]
    NotRecording,
    #[error("Command list is still recording")]
    StillRecording,
    #[error("Unknown command buffer: {0:?}")]
    UnknownCommandBuffer(vk::CommandBuffer),
    #[error("Out of device memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type GfxResult<T> = Result<T, GfxError>;
