//! 基于 ash + vk-mem 的 Vulkan 后端
//!
//! 需要 Vulkan 1.3（dynamic rendering 与 synchronization2）。
//! Instance、Device 与 swapchain 由调用者创建，这里只负责帧图需要的那部分。

mod command_list;
mod device;

pub use command_list::VulkanCommandList;
pub use device::VulkanDevice;

use ash::vk;

use crate::resources::image::GfxImageCreateInfo;

pub(crate) struct VulkanImage {
    pub handle: vk::Image,
    pub view: vk::ImageView,
    pub sampler: Option<vk::Sampler>,
    /// 外部导入的 image（例如 swapchain image）没有 allocation，也不由本设备销毁
    pub allocation: Option<vk_mem::Allocation>,
    pub info: GfxImageCreateInfo,
}
