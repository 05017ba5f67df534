//! Barrier 自动计算
//!
//! 按最终的 Pass 顺序遍历每个物理 image 的使用，为相邻两次使用之间生成
//! layout / stage / access 转换。与上一个 Pass 相邻的 attachment 转换可以折叠进
//! render pass 的 initial layout 与 pass dependency，其余都是显式 barrier。

use std::collections::HashMap;

use ash::vk;
use cadence_gfx::{GfxClearValue, GfxImageBarrier, GfxPassDependency, ImageHandle};
use itertools::Itertools;

use crate::{
    graph::GraphDecl,
    pass::{ImageUsage, PassType},
    plan::{PassKind, PhysicalImage, PlannedAttachment, PlannedPass, PlannedPresent, PlannedUsage},
    resource_state::RgImageState,
};

/// 图像 Barrier 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedBarrier {
    /// 物理 image 在 [`FramePlan`](crate::FramePlan) 中的索引
    pub image: usize,
    /// 源状态
    pub src_state: RgImageState,
    /// 目标状态
    pub dst_state: RgImageState,
    /// 图像 aspect（COLOR / DEPTH / STENCIL）
    pub aspect: vk::ImageAspectFlags,
}

impl PlannedBarrier {
    pub fn new(image: usize, src_state: RgImageState, dst_state: RgImageState, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            image,
            src_state,
            dst_state,
            aspect,
        }
    }

    /// 转换为 GfxImageBarrier
    ///
    /// src access 只保留写操作：读操作不需要被等待可见。
    pub fn to_gfx_barrier(&self, image: ImageHandle) -> GfxImageBarrier {
        GfxImageBarrier::new(image)
            .layout_transfer(self.src_state.layout, self.dst_state.layout)
            .src_mask(self.src_state.stage, self.src_state.src_access())
            .dst_mask(self.dst_state.stage, self.dst_state.access)
            .image_aspect_flag(self.aspect)
    }
}

/// 一次 swapchain 连接在 synthesize 时需要的信息
pub(crate) struct PresentRequest {
    pub window: u32,
    pub image: usize,
    pub swapchain_image: ImageHandle,
    pub swapchain_extent: vk::Extent2D,
}

/// 按 `order` 遍历 Pass，生成每个 Pass 的 barrier 与 attachment 描述
///
/// `images` 中的 `initial_state` 作为每个物理 image 的起点，结束后写回 `final_state`。
pub(crate) fn synthesize(
    decl: &GraphDecl,
    owner_index: &HashMap<crate::image::ImageId, usize>,
    order: &[usize],
    images: &mut [PhysicalImage],
    presents: &[PresentRequest],
    fold_attachment_transitions: bool,
) -> (Vec<PlannedPass>, Vec<PlannedPresent>) {
    let mut current: Vec<RgImageState> = images.iter().map(|image| image.initial_state).collect();
    // 每个物理 image 最后一次被使用时所在的执行位置
    let mut last_position: Vec<Option<usize>> = vec![None; images.len()];

    let mut planned_passes = Vec::with_capacity(order.len());
    for (position, &pass_index) in order.iter().enumerate() {
        let pass = &decl.passes[pass_index];
        let (kind, extent, samples, stage_hint, access_hint) = match pass.ty {
            PassType::Graphics { extent, samples } => (PassKind::Graphics, Some(extent), samples, None, None),
            PassType::Compute {
                stage_hint,
                access_hint,
            } => (PassKind::Compute, None, vk::SampleCountFlags::TYPE_1, stage_hint, access_hint),
        };

        let usages = pass
            .usages
            .iter()
            .map(|(image, usage)| PlannedUsage {
                image: owner_index[image],
                usage: *usage,
                state: RgImageState::from_usage(usage, stage_hint, access_hint),
            })
            .collect_vec();

        // 同一物理 image 的多种用法合并成一个状态
        let required: Vec<(usize, RgImageState, bool)> = usages
            .iter()
            .map(|usage| usage.image)
            .unique()
            .map(|image| {
                let mut matching = usages.iter().filter(|usage| usage.image == image);
                let first = matching.next().map(|usage| usage.state).unwrap_or_default();
                let state = matching.fold(first, |acc, usage| acc.merge(usage.state));
                let is_attachment = usages.iter().any(|usage| usage.image == image && usage.usage.is_attachment());
                (image, state, is_attachment)
            })
            .collect();

        let mut barriers = vec![];
        let mut folded = vec![];
        let mut dependency = GfxPassDependency::default();
        let mut initial_layouts = HashMap::new();

        for &(image, state, is_attachment) in &required {
            let prev = current[image];
            let adjacent = position > 0 && last_position[image] == Some(position - 1);
            let barrier = PlannedBarrier::new(image, prev, state, images[image].aspect);

            if fold_attachment_transitions && kind == PassKind::Graphics && is_attachment && adjacent {
                if prev.needs_barrier_to(&state) {
                    dependency.merge(prev.stage, prev.src_access(), state.stage, state.access);
                    folded.push(barrier);
                }
                initial_layouts.insert(image, prev.layout);
            } else {
                if prev.needs_barrier_to(&state) {
                    barriers.push(barrier);
                }
                initial_layouts.insert(image, state.layout);
            }

            current[image] = state;
            last_position[image] = Some(position);
        }

        let mut color_attachments = vec![];
        let mut depth_stencil_attachment = None;
        for usage in &usages {
            let attachment = |load_op: vk::AttachmentLoadOp, clear_value: Option<GfxClearValue>| {
                let pass_layout = current[usage.image].layout;
                if load_op == vk::AttachmentLoadOp::LOAD && initial_layouts[&usage.image] == vk::ImageLayout::UNDEFINED {
                    log::warn!(
                        "pass \"{}\" loads image {} whose contents are undefined",
                        pass.name,
                        images[usage.image].key
                    );
                }
                PlannedAttachment {
                    image: usage.image,
                    format: images[usage.image].create_info.format,
                    load_op,
                    store_op: vk::AttachmentStoreOp::STORE,
                    clear_value,
                    initial_layout: initial_layouts[&usage.image],
                    pass_layout,
                }
            };
            match usage.usage {
                ImageUsage::ColorAttachment { load_op, clear } => {
                    color_attachments.push(attachment(load_op, clear.map(GfxClearValue::Color)));
                }
                ImageUsage::DepthStencilAttachment { load_op, clear } => {
                    let clear = clear.map(|value| GfxClearValue::DepthStencil {
                        depth: value.depth,
                        stencil: value.stencil,
                    });
                    depth_stencil_attachment = Some(attachment(load_op, clear));
                }
                _ => {}
            }
        }

        planned_passes.push(PlannedPass {
            index: pass_index,
            name: pass.name.clone(),
            component: decl.components[pass.component.0].name.clone(),
            kind,
            extent,
            samples,
            usages,
            barriers,
            folded,
            color_attachments,
            depth_stencil_attachment,
            dependency,
        });
    }

    // 所有 Pass 之后：blit 到 swapchain
    let planned_presents = presents
        .iter()
        .map(|request| {
            let prev = current[request.image];
            let src_barrier = prev.needs_barrier_to(&RgImageState::TRANSFER_SRC).then(|| {
                PlannedBarrier::new(request.image, prev, RgImageState::TRANSFER_SRC, images[request.image].aspect)
            });
            current[request.image] = RgImageState::TRANSFER_SRC;
            last_position[request.image] = None;

            let source = images[request.image].declared_extent;
            PlannedPresent {
                window: request.window,
                image: request.image,
                swapchain_image: request.swapchain_image,
                src_barrier,
                blit_extent: vk::Extent2D {
                    width: source.width.min(request.swapchain_extent.width),
                    height: source.height.min(request.swapchain_extent.height),
                },
            }
        })
        .collect_vec();

    for (image, state) in images.iter_mut().zip(current) {
        image.final_state = state;
    }

    (planned_passes, planned_presents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_gfx_barrier_strips_read_access() {
        let barrier = PlannedBarrier::new(
            0,
            RgImageState::COLOR_ATTACHMENT_READ_WRITE,
            RgImageState::SHADER_READ_FRAGMENT,
            vk::ImageAspectFlags::COLOR,
        );
        let gfx = barrier.to_gfx_barrier(ImageHandle::default());

        assert_eq!(gfx.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(gfx.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(gfx.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(gfx.dst_access, vk::AccessFlags2::SHADER_READ);
        assert_eq!(gfx.src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(gfx.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
    }
}
