//! 按 [`FramePlan`] 在命令列表上回放帧图

use ash::vk;
use cadence_crate_tools::profile_scope;
use cadence_gfx::{
    GfxAttachmentInfo, GfxCommandList, GfxImageBarrier, GfxImageBlit, GfxPassBeginInfo, ImageHandle, LabelColor,
};
use itertools::Itertools;

use crate::{
    error::RenderGraphResult,
    graph::GraphDecl,
    pass::{ComputePassScope, GraphicsPassScope, ImageLookup, PassCallback},
    plan::{FramePlan, PassKind, PlannedAttachment, PlannedPass},
    resource_state::RgImageState,
    storage::GraphStorage,
};

pub(crate) struct FrameRecorder<'r> {
    pub decl: &'r GraphDecl,
    pub plan: &'r FramePlan,
    pub storage: &'r GraphStorage,
    /// 所有物理 image 的句柄，与 `plan.images` 一一对应
    pub handles: &'r [ImageHandle],
    pub frame_index: usize,
}

impl FrameRecorder<'_> {
    /// 录制整帧：所有 pass，然后是 swapchain blit
    pub fn record<'a>(
        &self,
        cmd: &mut dyn GfxCommandList,
        callbacks: &mut [Option<PassCallback<'a>>],
    ) -> RenderGraphResult<()> {
        profile_scope!("RenderGraph::record");

        cmd.begin()?;
        for pass in &self.plan.passes {
            self.record_pass(cmd, pass, callbacks[pass.index].take());
        }
        self.record_presents(cmd);
        cmd.end()?;
        Ok(())
    }

    fn record_pass(&self, cmd: &mut dyn GfxCommandList, pass: &PlannedPass, callback: Option<PassCallback>) {
        log::debug!("record pass \"{}\" of component \"{}\"", pass.name, pass.component);

        let label_color = match pass.kind {
            PassKind::Graphics => LabelColor::COLOR_PASS,
            PassKind::Compute => LabelColor::COMPUTE_PASS,
        };
        cmd.begin_label(&pass.name, label_color);

        if !pass.barriers.is_empty() {
            let barriers =
                pass.barriers.iter().map(|barrier| barrier.to_gfx_barrier(self.handles[barrier.image])).collect_vec();
            cmd.cmd_image_memory_barrier(vk::DependencyFlags::empty(), &barriers);
        }

        let lookup = ImageLookup {
            decl: self.decl,
            links: &self.plan.links,
            storage: self.storage,
        };
        match callback {
            Some(PassCallback::Graphics(callback)) => {
                let begin_info = self.pass_begin_info(pass);
                let scope = GraphicsPassScope {
                    name: &pass.name,
                    extent: begin_info.extent,
                    frame_index: self.frame_index,
                    lookup,
                };
                cmd.cmd_begin_pass(&begin_info);
                callback(&scope, &mut *cmd);
                cmd.cmd_end_pass();
            }
            Some(PassCallback::Compute(callback)) => {
                let scope = ComputePassScope {
                    name: &pass.name,
                    frame_index: self.frame_index,
                    lookup,
                };
                callback(&scope, &mut *cmd);
            }
            None => log::warn!("pass \"{}\" has no callback", pass.name),
        }

        cmd.end_label();
    }

    fn attachment_info(&self, attachment: &PlannedAttachment) -> GfxAttachmentInfo {
        GfxAttachmentInfo {
            image: self.handles[attachment.image],
            format: attachment.format,
            load_op: attachment.load_op,
            store_op: attachment.store_op,
            initial_layout: attachment.initial_layout,
            pass_layout: attachment.pass_layout,
            clear_value: attachment.clear_value,
        }
    }

    fn pass_begin_info(&self, pass: &PlannedPass) -> GfxPassBeginInfo {
        GfxPassBeginInfo {
            name: pass.name.clone(),
            extent: pass.extent.unwrap_or_default(),
            samples: pass.samples,
            color_attachments: pass.color_attachments.iter().map(|attachment| self.attachment_info(attachment)).collect(),
            depth_stencil_attachment: pass.depth_stencil_attachment.as_ref().map(|attachment| {
                self.attachment_info(attachment)
            }),
            dependency: pass.dependency,
        }
    }

    fn record_presents(&self, cmd: &mut dyn GfxCommandList) {
        for present in &self.plan.presents {
            let source = self.handles[present.image];
            cmd.begin_label(&format!("present window {}", present.window), LabelColor::TRANSFER);

            let mut barriers = vec![];
            if let Some(barrier) = &present.src_barrier {
                barriers.push(barrier.to_gfx_barrier(source));
            }
            barriers.push(swapchain_barrier(present.swapchain_image, RgImageState::UNDEFINED, RgImageState::TRANSFER_DST));
            cmd.cmd_image_memory_barrier(vk::DependencyFlags::empty(), &barriers);

            cmd.cmd_blit_image(&GfxImageBlit::aligned(
                source,
                present.swapchain_image,
                present.blit_extent,
                vk::Filter::NEAREST,
            ));

            cmd.cmd_image_memory_barrier(
                vk::DependencyFlags::empty(),
                &[swapchain_barrier(present.swapchain_image, RgImageState::TRANSFER_DST, RgImageState::PRESENT)],
            );
            cmd.end_label();
        }
    }
}

fn swapchain_barrier(image: ImageHandle, src: RgImageState, dst: RgImageState) -> GfxImageBarrier {
    GfxImageBarrier::new(image)
        .layout_transfer(src.layout, dst.layout)
        .src_mask(src.stage, src.src_access())
        .dst_mask(dst.stage, dst.access)
        .image_aspect_flag(vk::ImageAspectFlags::COLOR)
}
