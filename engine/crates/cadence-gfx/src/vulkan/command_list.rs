use std::{cell::RefCell, ffi::CString, rc::Rc};

use ash::vk;
use itertools::Itertools;
use slotmap::SlotMap;

use crate::{
    commands::{barrier::GfxImageBarrier, blit::GfxImageBlit, pass::GfxPassBeginInfo},
    device::GfxCommandList,
    error::GfxResult,
    handles::ImageHandle,
    vulkan::VulkanImage,
};

pub struct VulkanCommandList {
    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    images: Rc<RefCell<SlotMap<ImageHandle, VulkanImage>>>,
    vk_handle: vk::CommandBuffer,
}

// new & init
impl VulkanCommandList {
    pub(crate) fn new(
        device: ash::Device,
        debug_utils: Option<ash::ext::debug_utils::Device>,
        images: Rc<RefCell<SlotMap<ImageHandle, VulkanImage>>>,
        vk_handle: vk::CommandBuffer,
    ) -> Self {
        Self {
            device,
            debug_utils,
            images,
            vk_handle,
        }
    }
}

// tools
impl VulkanCommandList {
    fn vk_image(&self, image: ImageHandle) -> Option<(vk::Image, vk::ImageView)> {
        let images = self.images.borrow();
        let image_state = images.get(image);
        if image_state.is_none() {
            log::error!("command references unknown image {image:?}");
        }
        image_state.map(|image| (image.handle, image.view))
    }

    fn vk_image_barriers(&self, barriers: &[GfxImageBarrier]) -> Vec<vk::ImageMemoryBarrier2<'static>> {
        barriers
            .iter()
            .filter_map(|barrier| {
                let (image, _) = self.vk_image(barrier.image)?;
                Some(
                    vk::ImageMemoryBarrier2::default()
                        .image(image)
                        .old_layout(barrier.old_layout)
                        .new_layout(barrier.new_layout)
                        .src_stage_mask(barrier.src_stage)
                        .src_access_mask(barrier.src_access)
                        .dst_stage_mask(barrier.dst_stage)
                        .dst_access_mask(barrier.dst_access)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .subresource_range(barrier.subresource_range()),
                )
            })
            .collect_vec()
    }
}

impl GfxCommandList for VulkanCommandList {
    fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    fn begin(&mut self) -> GfxResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(self.vk_handle, &begin_info)? };
        Ok(())
    }

    fn end(&mut self) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(self.vk_handle)? };
        Ok(())
    }

    fn begin_label(&mut self, label_name: &str, label_color: [f32; 4]) {
        let (Some(debug_utils), Ok(name)) = (&self.debug_utils, CString::new(label_name)) else {
            return;
        };
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color),
            );
        }
    }

    fn end_label(&mut self) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(self.vk_handle) };
        }
    }

    fn cmd_begin_pass(&mut self, info: &GfxPassBeginInfo) {
        let (transitions, dependency) = info.entry_sync();
        let image_barriers = self.vk_image_barriers(&transitions);
        let memory_barriers = dependency
            .map(|dependency| {
                vk::MemoryBarrier2::default()
                    .src_stage_mask(dependency.src_stage)
                    .src_access_mask(dependency.src_access)
                    .dst_stage_mask(dependency.dst_stage)
                    .dst_access_mask(dependency.dst_access)
            })
            .into_iter()
            .collect_vec();
        if !image_barriers.is_empty() || !memory_barriers.is_empty() {
            let dependency_info = vk::DependencyInfo::default()
                .memory_barriers(&memory_barriers)
                .image_memory_barriers(&image_barriers);
            unsafe { self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info) };
        }

        let to_rendering_attachment = |attachment: &crate::GfxAttachmentInfo| {
            let (_, view) = self.vk_image(attachment.image).unwrap_or_default();
            let mut rendering_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(attachment.pass_layout)
                .load_op(attachment.load_op)
                .store_op(attachment.store_op);
            if let Some(clear_value) = attachment.clear_value {
                rendering_attachment = rendering_attachment.clear_value(clear_value.to_vk());
            }
            rendering_attachment
        };
        let color_attachments = info.color_attachments.iter().map(to_rendering_attachment).collect_vec();
        let depth_attachment = info.depth_stencil_attachment.as_ref().map(to_rendering_attachment);

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(info.render_area())
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = &depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }
        unsafe { self.device.cmd_begin_rendering(self.vk_handle, &rendering_info) };
    }

    fn cmd_end_pass(&mut self) {
        unsafe { self.device.cmd_end_rendering(self.vk_handle) };
    }

    fn cmd_image_memory_barrier(&mut self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        let barriers = self.vk_image_barriers(barriers);
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe { self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info) };
    }

    fn cmd_blit_image(&mut self, blit: &GfxImageBlit) {
        let (Some((src, _)), Some((dst, _))) = (self.vk_image(blit.src_image), self.vk_image(blit.dst_image)) else {
            return;
        };
        unsafe {
            self.device.cmd_blit_image(
                self.vk_handle,
                src,
                blit.src_layout,
                dst,
                blit.dst_layout,
                &[blit.to_vk()],
                blit.filter,
            );
        }
    }

    fn cmd_draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw(self.vk_handle, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    fn cmd_dispatch(&mut self, group_count: [u32; 3]) {
        unsafe {
            self.device.cmd_dispatch(self.vk_handle, group_count[0], group_count[1], group_count[2]);
        }
    }
}
