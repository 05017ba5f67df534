use ash::vk;

use crate::{commands::barrier::GfxImageBarrier, handles::ImageHandle, resources::image::GfxFormatUtils};

/// attachment 的 clear value
///
/// `vk::ClearValue` 是 union，这里用 enum 表示，便于检查与比较。
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GfxClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl GfxClearValue {
    #[inline]
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            GfxClearValue::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            GfxClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// render pass 中的一个 attachment
///
/// `initial_layout` 是 image 进入 pass 前的 layout（上一次使用留下的），
/// 后端负责把它转换到 `pass_layout`；pass 结束后 image 保持在 `pass_layout`。
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GfxAttachmentInfo {
    pub image: ImageHandle,
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub pass_layout: vk::ImageLayout,
    pub clear_value: Option<GfxClearValue>,
}

/// pass 开始时的外部 dependency
///
/// 由折叠进 attachment 的 layout 转换累积而来；没有折叠时为空。
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxPassDependency {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl GfxPassDependency {
    #[inline]
    pub fn merge(
        &mut self,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) {
        self.src_stage |= src_stage;
        self.src_access |= src_access;
        self.dst_stage |= dst_stage;
        self.dst_access |= dst_access;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.src_stage.is_empty() && self.dst_stage.is_empty()
    }
}

/// 开始一个 render pass 所需的全部信息
#[derive(Clone, Debug, PartialEq)]
pub struct GfxPassBeginInfo {
    pub name: String,
    pub extent: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
    pub color_attachments: Vec<GfxAttachmentInfo>,
    pub depth_stencil_attachment: Option<GfxAttachmentInfo>,
    pub dependency: GfxPassDependency,
}

impl GfxPassBeginInfo {
    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }

    #[inline]
    pub fn attachments(&self) -> impl Iterator<Item = &GfxAttachmentInfo> {
        self.color_attachments.iter().chain(self.depth_stencil_attachment.iter())
    }

    /// pass 开始前需要录制的同步
    ///
    /// dynamic rendering 没有 initial layout 与 external dependency：layout 不同的 attachment
    /// 转换为 image barrier；dependency 非空时额外返回，由后端记录为 memory barrier，
    /// layout 相同（例如 CLEAR 之后 LOAD）时也不能省略。
    pub fn entry_sync(&self) -> (Vec<GfxImageBarrier>, Option<GfxPassDependency>) {
        let transitions = self
            .attachments()
            .filter(|attachment| attachment.initial_layout != attachment.pass_layout)
            .map(|attachment| {
                GfxImageBarrier::new(attachment.image)
                    .layout_transfer(attachment.initial_layout, attachment.pass_layout)
                    .src_mask(self.dependency.src_stage, self.dependency.src_access)
                    .dst_mask(self.dependency.dst_stage, self.dependency.dst_access)
                    .image_aspect_flag(GfxFormatUtils::aspect(attachment.format))
            })
            .collect();
        let dependency = (!self.dependency.is_empty()).then_some(self.dependency);
        (transitions, dependency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(initial_layout: vk::ImageLayout, load_op: vk::AttachmentLoadOp) -> GfxAttachmentInfo {
        GfxAttachmentInfo {
            image: ImageHandle::default(),
            format: vk::Format::R8G8B8A8_UNORM,
            load_op,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout,
            pass_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            clear_value: None,
        }
    }

    fn begin_info(attachment: GfxAttachmentInfo, dependency: GfxPassDependency) -> GfxPassBeginInfo {
        GfxPassBeginInfo {
            name: "transparent".to_string(),
            extent: vk::Extent2D { width: 4, height: 4 },
            samples: vk::SampleCountFlags::TYPE_1,
            color_attachments: vec![attachment],
            depth_stencil_attachment: None,
            dependency,
        }
    }

    fn attachment_write_dependency() -> GfxPassDependency {
        let mut dependency = GfxPassDependency::default();
        dependency.merge(
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        );
        dependency
    }

    #[test]
    fn same_layout_dependency_is_kept() {
        let info = begin_info(
            attachment(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::AttachmentLoadOp::LOAD),
            attachment_write_dependency(),
        );
        let (transitions, dependency) = info.entry_sync();

        assert!(transitions.is_empty());
        assert_eq!(dependency, Some(attachment_write_dependency()));
    }

    #[test]
    fn layout_change_uses_dependency_masks() {
        let info = begin_info(
            attachment(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::AttachmentLoadOp::LOAD),
            attachment_write_dependency(),
        );
        let (transitions, _) = info.entry_sync();

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(transitions[0].src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(transitions[0].aspect, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn no_sync_without_dependency_or_transition() {
        let info = begin_info(
            attachment(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::AttachmentLoadOp::LOAD),
            GfxPassDependency::default(),
        );
        let (transitions, dependency) = info.entry_sync();

        assert!(transitions.is_empty());
        assert!(dependency.is_none());
    }
}
