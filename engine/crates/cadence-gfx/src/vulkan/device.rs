use std::{cell::RefCell, ffi::CString, rc::Rc};

use ash::vk;
use cadence_crate_tools::profile_scope;
use slotmap::SlotMap;
use vk_mem::Alloc;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    device::{GfxCommandList, GfxDevice},
    error::{GfxError, GfxResult},
    handles::ImageHandle,
    resources::image::GfxImageCreateInfo,
    vulkan::{VulkanImage, command_list::VulkanCommandList},
};

pub struct VulkanDevice {
    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    allocator: vk_mem::Allocator,

    queue: vk::Queue,
    /// 每个 frame in flight 一个 command pool
    command_pools: Vec<vk::CommandPool>,

    images: Rc<RefCell<SlotMap<ImageHandle, VulkanImage>>>,

    frame_index: usize,
}

// new & init
impl VulkanDevice {
    /// # Safety
    /// `instance` 与 `device` 必须在本对象的整个生命周期内有效
    pub unsafe fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
        frames_in_flight: usize,
        enable_debug_utils: bool,
    ) -> GfxResult<Self> {
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, &device, physical_device);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci)? };

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        let command_pools = (0..frames_in_flight.max(1))
            .map(|_| {
                let pool_ci = vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT);
                unsafe { device.create_command_pool(&pool_ci, None) }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let debug_utils = enable_debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        Ok(Self {
            device,
            debug_utils,
            allocator,
            queue,
            command_pools,
            images: Rc::new(RefCell::new(SlotMap::with_key())),
            frame_index: 0,
        })
    }

    /// 导入外部 image（例如 swapchain image），返回的 handle 可以作为 blit 的目标
    pub fn import_image(&mut self, handle: vk::Image, view: vk::ImageView, info: GfxImageCreateInfo) -> ImageHandle {
        self.images.borrow_mut().insert(VulkanImage {
            handle,
            view,
            sampler: None,
            allocation: None,
            info,
        })
    }

    /// 移除导入的 image，不销毁 Vulkan 资源
    pub fn forget_image(&mut self, image: ImageHandle) {
        self.images.borrow_mut().remove(image);
    }

    /// 进入下一帧并重置该帧的 command pool
    ///
    /// 调用前必须已经等待该帧上一次提交的 fence。
    pub fn advance_frame(&mut self) -> GfxResult<()> {
        self.frame_index = (self.frame_index + 1) % self.command_pools.len();
        unsafe {
            self.device
                .reset_command_pool(self.command_pools[self.frame_index], vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }

    pub fn destroy(mut self) {
        let _ = self.wait_idle();
        let images = std::mem::take(&mut *self.images.borrow_mut());
        for (_, image) in images {
            self.destroy_vulkan_image(image);
        }
        unsafe {
            for pool in self.command_pools.drain(..) {
                self.device.destroy_command_pool(pool, None);
            }
        }
    }
}

// getters
impl VulkanDevice {
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    pub fn image_view(&self, image: ImageHandle) -> Option<vk::ImageView> {
        self.images.borrow().get(image).map(|image| image.view)
    }

    pub fn image_sampler(&self, image: ImageHandle) -> Option<vk::Sampler> {
        self.images.borrow().get(image).and_then(|image| image.sampler)
    }
}

// tools
impl VulkanDevice {
    fn set_debug_name<T: vk::Handle>(&self, handle: T, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let name_info = vk::DebugUtilsObjectNameInfoEXT::default().object_handle(handle).object_name(&name);
        unsafe {
            if let Err(e) = debug_utils.set_debug_utils_object_name(&name_info) {
                log::warn!("failed to set debug name {name:?}: {e}");
            }
        }
    }

    fn destroy_vulkan_image(&self, mut image: VulkanImage) {
        let Some(mut allocation) = image.allocation.take() else {
            return;
        };
        unsafe {
            if let Some(sampler) = image.sampler {
                self.device.destroy_sampler(sampler, None);
            }
            self.device.destroy_image_view(image.view, None);
            self.allocator.destroy_image(image.handle, &mut allocation);
        }
    }
}

impl GfxDevice for VulkanDevice {
    fn create_image(&mut self, info: &GfxImageCreateInfo, debug_name: &str) -> GfxResult<ImageHandle> {
        let image_ci = info.vk_create_info();
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (handle, mut allocation) = unsafe { self.allocator.create_image(&image_ci, &alloc_ci) }.map_err(|e| {
            GfxError::ImageCreationFailed {
                name: debug_name.to_string(),
                reason: e.to_string(),
            }
        })?;

        let view_ci = vk::ImageViewCreateInfo::default()
            .image(handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(info.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: info.aspect(),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { self.device.create_image_view(&view_ci, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { self.allocator.destroy_image(handle, &mut allocation) };
                return Err(e.into());
            }
        };
        let sampler = match info.sampler {
            Some(desc) => match unsafe { self.device.create_sampler(&desc.create_info(), None) } {
                Ok(sampler) => Some(sampler),
                Err(e) => {
                    unsafe {
                        self.device.destroy_image_view(view, None);
                        self.allocator.destroy_image(handle, &mut allocation);
                    }
                    return Err(e.into());
                }
            },
            None => None,
        };

        self.set_debug_name(handle, debug_name);
        self.set_debug_name(view, &format!("{debug_name}-view"));

        Ok(self.images.borrow_mut().insert(VulkanImage {
            handle,
            view,
            sampler,
            allocation: Some(allocation),
            info: *info,
        }))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        let removed = self.images.borrow_mut().remove(image);
        if let Some(image) = removed {
            self.destroy_vulkan_image(image);
        }
    }

    fn image_extent(&self, image: ImageHandle) -> Option<vk::Extent2D> {
        self.images.borrow().get(image).map(|image| image.info.extent())
    }

    fn image_format(&self, image: ImageHandle) -> Option<vk::Format> {
        self.images.borrow().get(image).map(|image| image.info.format)
    }

    fn wait_idle(&mut self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn create_command_list(&mut self, debug_name: &str) -> GfxResult<Box<dyn GfxCommandList>> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pools[self.frame_index])
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let handle = unsafe { self.device.allocate_command_buffers(&allocate_info)? }[0];
        self.set_debug_name(handle, debug_name);

        Ok(Box::new(VulkanCommandList::new(
            self.device.clone(),
            self.debug_utils.clone(),
            self.images.clone(),
            handle,
        )))
    }

    fn submit(&mut self, submit_info: &GfxSubmitInfo) -> GfxResult<()> {
        profile_scope!("VulkanDevice::submit");

        let command_buffers = submit_info.command_buffer_infos();
        let waits = submit_info.wait_infos();
        let signals = submit_info.signal_infos();
        let info = vk::SubmitInfo2::default()
            .command_buffer_infos(&command_buffers)
            .wait_semaphore_infos(&waits)
            .signal_semaphore_infos(&signals);
        unsafe {
            self.device.queue_submit2(self.queue, &[info], submit_info.fence.unwrap_or_default())?;
        }
        Ok(())
    }

    fn frame_index(&self) -> usize {
        self.frame_index
    }

    fn frames_in_flight(&self) -> usize {
        self.command_pools.len()
    }
}
