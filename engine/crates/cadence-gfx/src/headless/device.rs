use std::{cell::RefCell, rc::Rc};

use ash::vk::{self, Handle};
use cadence_crate_tools::profile_scope;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    device::{GfxCommandList, GfxDevice},
    error::{GfxError, GfxResult},
    handles::ImageHandle,
    headless::{
        command_list::HeadlessCommandList,
        state::{HeadlessCommand, HeadlessImage, HeadlessState},
    },
    resources::image::GfxImageCreateInfo,
};

/// 在 CPU 上执行命令的设备
///
/// 除了 [`GfxDevice`] 之外，还提供一组检查接口：像素回读、当前 layout、
/// 执行过的命令以及 validation error。
pub struct HeadlessDevice {
    state: Rc<RefCell<HeadlessState>>,
    frame_index: usize,
    frames_in_flight: usize,
}

// new & init
impl HeadlessDevice {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(HeadlessState::default())),
            frame_index: 0,
            frames_in_flight: frames_in_flight.max(1),
        }
    }

    /// 创建一个模拟 swapchain image 的外部 image，不计入 [`Self::live_image_count`]
    pub fn create_swapchain_image(&mut self, name: &str, extent: vk::Extent2D, format: vk::Format) -> ImageHandle {
        let info = GfxImageCreateInfo::new_2d(
            format,
            extent,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        );
        self.state.borrow_mut().images.insert(HeadlessImage::new(name, info, true))
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(2)
    }
}

// getters
impl HeadlessDevice {
    /// 按行优先返回 image 的全部像素
    pub fn read_pixels(&self, image: ImageHandle) -> Option<Vec<[f32; 4]>> {
        self.state.borrow().images.get(image).map(|image| image.pixels.clone())
    }

    pub fn read_pixel(&self, image: ImageHandle, x: u32, y: u32) -> Option<[f32; 4]> {
        let state = self.state.borrow();
        let image = state.images.get(image)?;
        if x >= image.info.width || y >= image.info.height {
            return None;
        }
        image.pixels.get((y * image.info.width + x) as usize).copied()
    }

    /// depth image 的 stencil 值
    pub fn read_stencil(&self, image: ImageHandle, x: u32, y: u32) -> Option<u32> {
        let state = self.state.borrow();
        let image = state.images.get(image)?;
        if x >= image.info.width || y >= image.info.height {
            return None;
        }
        image.stencil.get((y * image.info.width + x) as usize).copied()
    }

    pub fn image_layout(&self, image: ImageHandle) -> Option<vk::ImageLayout> {
        self.state.borrow().images.get(image).map(|image| image.layout)
    }

    pub fn image_info(&self, image: ImageHandle) -> Option<GfxImageCreateInfo> {
        self.state.borrow().images.get(image).map(|image| image.info)
    }

    /// 由本设备创建、尚未销毁的 image 数量
    pub fn live_image_count(&self) -> usize {
        self.state.borrow().live_image_count()
    }

    pub fn validation_errors(&self) -> Vec<String> {
        self.state.borrow().validation_errors.clone()
    }

    /// 所有已提交并执行的命令，按执行顺序
    pub fn executed_commands(&self) -> Vec<HeadlessCommand> {
        self.state.borrow().executed.clone()
    }

    pub fn signaled_fences(&self) -> Vec<vk::Fence> {
        self.state.borrow().signaled_fences.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.state.borrow().submit_count
    }

    pub fn wait_idle_count(&self) -> usize {
        self.state.borrow().wait_idle_count
    }
}

// tools
impl HeadlessDevice {
    pub fn advance_frame(&mut self) {
        self.frame_index = (self.frame_index + 1) % self.frames_in_flight;
    }

    /// 限制 live image 的数量，用于模拟显存耗尽
    pub fn set_image_budget(&mut self, budget: Option<usize>) {
        self.state.borrow_mut().image_budget = budget;
    }

    pub fn clear_executed_commands(&mut self) {
        self.state.borrow_mut().executed.clear();
    }
}

impl GfxDevice for HeadlessDevice {
    fn create_image(&mut self, info: &GfxImageCreateInfo, debug_name: &str) -> GfxResult<ImageHandle> {
        let mut state = self.state.borrow_mut();
        if state.image_budget.is_some_and(|budget| state.live_image_count() >= budget) {
            return Err(GfxError::OutOfMemory);
        }
        if info.width == 0 || info.height == 0 {
            return Err(GfxError::ImageCreationFailed {
                name: debug_name.to_string(),
                reason: format!("zero extent {}x{}", info.width, info.height),
            });
        }
        log::debug!("[headless] create image \"{debug_name}\" {}x{} {:?}", info.width, info.height, info.format);
        Ok(state.images.insert(HeadlessImage::new(debug_name, *info, false)))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        if let Some(image) = self.state.borrow_mut().images.remove(image) {
            log::debug!("[headless] destroy image \"{}\"", image.name);
        }
    }

    fn image_extent(&self, image: ImageHandle) -> Option<vk::Extent2D> {
        self.state.borrow().images.get(image).map(|image| image.info.extent())
    }

    fn image_format(&self, image: ImageHandle) -> Option<vk::Format> {
        self.state.borrow().images.get(image).map(|image| image.info.format)
    }

    fn wait_idle(&mut self) -> GfxResult<()> {
        self.state.borrow_mut().wait_idle_count += 1;
        Ok(())
    }

    fn create_command_list(&mut self, debug_name: &str) -> GfxResult<Box<dyn GfxCommandList>> {
        let handle = {
            let mut state = self.state.borrow_mut();
            state.next_command_buffer += 1;
            vk::CommandBuffer::from_raw(state.next_command_buffer)
        };
        Ok(Box::new(HeadlessCommandList::new(self.state.clone(), handle, debug_name)))
    }

    fn submit(&mut self, submit_info: &GfxSubmitInfo) -> GfxResult<()> {
        profile_scope!("HeadlessDevice::submit");

        let mut state = self.state.borrow_mut();
        for command_buffer in &submit_info.command_buffers {
            let commands = state
                .pending_lists
                .remove(command_buffer)
                .ok_or(GfxError::UnknownCommandBuffer(*command_buffer))?;
            for command in &commands {
                state.execute(command);
            }
        }
        if let Some(fence) = submit_info.fence {
            state.signaled_fences.push(fence);
        }
        state.submit_count += 1;
        Ok(())
    }

    fn frame_index(&self) -> usize {
        self.frame_index
    }

    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GfxAttachmentInfo, GfxClearValue, GfxImageBarrier, GfxImageBlit, GfxPassBeginInfo, GfxPassDependency};

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn color_image(device: &mut HeadlessDevice, name: &str, size: vk::Extent2D) -> ImageHandle {
        let info = GfxImageCreateInfo::new_2d(
            vk::Format::R8G8B8A8_UNORM,
            size,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
        );
        device.create_image(&info, name).unwrap()
    }

    fn clear_pass(image: ImageHandle, size: vk::Extent2D, color: [f32; 4]) -> GfxPassBeginInfo {
        GfxPassBeginInfo {
            name: "clear".to_string(),
            extent: size,
            samples: vk::SampleCountFlags::TYPE_1,
            color_attachments: vec![GfxAttachmentInfo {
                image,
                format: vk::Format::R8G8B8A8_UNORM,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                pass_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                clear_value: Some(GfxClearValue::Color(color)),
            }],
            depth_stencil_attachment: None,
            dependency: GfxPassDependency::default(),
        }
    }

    #[test]
    fn clear_then_blit_to_swapchain() {
        let mut device = HeadlessDevice::default();
        let size = extent(4, 4);
        let image = color_image(&mut device, "color", size);
        let swapchain = device.create_swapchain_image("swapchain", extent(8, 8), vk::Format::B8G8R8A8_UNORM);

        let mut cmd = device.create_command_list("test").unwrap();
        cmd.begin().unwrap();
        cmd.cmd_begin_pass(&clear_pass(image, size, [1.0, 0.0, 0.0, 1.0]));
        cmd.cmd_draw(3, 1, 0, 0);
        cmd.cmd_end_pass();
        cmd.cmd_image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[
                GfxImageBarrier::new(image)
                    .layout_transfer(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                    .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
                GfxImageBarrier::new(swapchain)
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            ],
        );
        cmd.cmd_blit_image(&GfxImageBlit::aligned(image, swapchain, size, vk::Filter::NEAREST));
        cmd.end().unwrap();
        device.submit(&GfxSubmitInfo::new(&[cmd.vk_handle()])).unwrap();

        assert!(device.validation_errors().is_empty(), "{:?}", device.validation_errors());
        assert_eq!(device.read_pixel(swapchain, 3, 3), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(device.read_pixel(swapchain, 4, 4), Some([0.0; 4]));
        assert_eq!(device.live_image_count(), 1);
    }

    fn load_pass(image: ImageHandle, size: vk::Extent2D, dependency: GfxPassDependency) -> GfxPassBeginInfo {
        let mut info = clear_pass(image, size, [0.0; 4]);
        info.name = "load".to_string();
        info.color_attachments[0].load_op = vk::AttachmentLoadOp::LOAD;
        info.color_attachments[0].clear_value = None;
        info.color_attachments[0].initial_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        info.dependency = dependency;
        info
    }

    fn run_two_passes(dependency: GfxPassDependency) -> HeadlessDevice {
        let mut device = HeadlessDevice::default();
        let size = extent(2, 2);
        let image = color_image(&mut device, "color", size);

        let mut cmd = device.create_command_list("test").unwrap();
        cmd.begin().unwrap();
        cmd.cmd_begin_pass(&clear_pass(image, size, [1.0; 4]));
        cmd.cmd_end_pass();
        cmd.cmd_begin_pass(&load_pass(image, size, dependency));
        cmd.cmd_end_pass();
        cmd.end().unwrap();
        device.submit(&GfxSubmitInfo::new(&[cmd.vk_handle()])).unwrap();
        device
    }

    #[test]
    fn write_after_write_without_dependency_is_reported() {
        let device = run_two_passes(GfxPassDependency::default());
        let errors = device.validation_errors();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("was written at"));
    }

    #[test]
    fn pass_dependency_waits_for_previous_write() {
        let mut dependency = GfxPassDependency::default();
        dependency.merge(
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        );
        let device = run_two_passes(dependency);
        assert!(device.validation_errors().is_empty(), "{:?}", device.validation_errors());
    }

    #[test]
    fn layout_only_barrier_does_not_wait_for_write() {
        let mut device = HeadlessDevice::default();
        let size = extent(2, 2);
        let image = color_image(&mut device, "color", size);
        let swapchain = device.create_swapchain_image("swapchain", size, vk::Format::B8G8R8A8_UNORM);

        let mut cmd = device.create_command_list("test").unwrap();
        cmd.begin().unwrap();
        cmd.cmd_begin_pass(&clear_pass(image, size, [1.0; 4]));
        cmd.cmd_end_pass();
        // 只做 layout 转换，没有等待 color attachment 的写入
        cmd.cmd_image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[
                GfxImageBarrier::new(image)
                    .layout_transfer(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                GfxImageBarrier::new(swapchain)
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            ],
        );
        cmd.cmd_blit_image(&GfxImageBlit::aligned(image, swapchain, size, vk::Filter::NEAREST));
        cmd.end().unwrap();
        device.submit(&GfxSubmitInfo::new(&[cmd.vk_handle()])).unwrap();

        let errors = device.validation_errors();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("\"color\" was written at"));
    }

    #[test]
    fn depth_clear_keeps_exact_stencil() {
        let mut device = HeadlessDevice::default();
        let size = extent(2, 2);
        let info = GfxImageCreateInfo::new_2d(
            vk::Format::D32_SFLOAT_S8_UINT,
            size,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        let depth = device.create_image(&info, "depth").unwrap();
        // 超过 f32 的整数精度
        let stencil = (1 << 24) + 1;

        let mut cmd = device.create_command_list("test").unwrap();
        cmd.begin().unwrap();
        cmd.cmd_begin_pass(&GfxPassBeginInfo {
            name: "depth".to_string(),
            extent: size,
            samples: vk::SampleCountFlags::TYPE_1,
            color_attachments: vec![],
            depth_stencil_attachment: Some(GfxAttachmentInfo {
                image: depth,
                format: vk::Format::D32_SFLOAT_S8_UINT,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                pass_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                clear_value: Some(GfxClearValue::DepthStencil { depth: 0.5, stencil }),
            }),
            dependency: GfxPassDependency::default(),
        });
        cmd.cmd_end_pass();
        cmd.end().unwrap();
        device.submit(&GfxSubmitInfo::new(&[cmd.vk_handle()])).unwrap();

        assert!(device.validation_errors().is_empty(), "{:?}", device.validation_errors());
        assert_eq!(device.read_pixel(depth, 1, 1).map(|pixel| pixel[0]), Some(0.5));
        assert_eq!(device.read_stencil(depth, 1, 1), Some(stencil));
    }

    #[test]
    fn layout_mismatch_is_reported() {
        let mut device = HeadlessDevice::default();
        let image = color_image(&mut device, "color", extent(2, 2));

        let mut cmd = device.create_command_list("test").unwrap();
        cmd.begin().unwrap();
        cmd.cmd_image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::new(image)
                .layout_transfer(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::GENERAL)],
        );
        cmd.end().unwrap();
        device.submit(&GfxSubmitInfo::new(&[cmd.vk_handle()])).unwrap();

        assert_eq!(device.validation_errors().len(), 1);
        assert_eq!(device.image_layout(image), Some(vk::ImageLayout::GENERAL));
    }

    #[test]
    fn image_budget_limits_creation() {
        let mut device = HeadlessDevice::default();
        device.set_image_budget(Some(1));
        color_image(&mut device, "a", extent(1, 1));
        let info = GfxImageCreateInfo::new_2d(vk::Format::R8G8B8A8_UNORM, extent(1, 1), vk::ImageUsageFlags::SAMPLED);
        assert!(matches!(device.create_image(&info, "b"), Err(GfxError::OutOfMemory)));
    }

    #[test]
    fn submit_requires_ended_list() {
        let mut device = HeadlessDevice::default();
        let mut cmd = device.create_command_list("test").unwrap();
        cmd.begin().unwrap();
        assert!(matches!(
            device.submit(&GfxSubmitInfo::new(&[cmd.vk_handle()])),
            Err(GfxError::UnknownCommandBuffer(_))
        ));
    }
}
