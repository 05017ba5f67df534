//! 资源状态定义
//!
//! 封装 Vulkan 的 pipeline stage、access mask 和 image layout，
//! 提供预定义的常用状态组合，以及 pass 中 image 用法到状态的映射。

use ash::vk;

use crate::pass::ImageUsage;

/// 图像资源状态
///
/// 描述图像在某个 Pass 中的使用方式，用于自动计算 barrier。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgImageState {
    /// Pipeline stage
    pub stage: vk::PipelineStageFlags2,
    /// Access mask
    pub access: vk::AccessFlags2,
    /// Image layout
    pub layout: vk::ImageLayout,
}

impl Default for RgImageState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

// new & 常量定义
impl RgImageState {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self { stage, access, layout }
    }

    // ============ 预定义状态常量 ============

    /// 未定义状态（首次使用或内容已失效）
    pub const UNDEFINED: Self =
        Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED);

    /// 颜色附件写入（load op 为 CLEAR / DONT_CARE）
    pub const COLOR_ATTACHMENT_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );

    /// 颜色附件读写（load op 为 LOAD）
    pub const COLOR_ATTACHMENT_READ_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw() | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );

    /// 深度附件读写
    pub const DEPTH_ATTACHMENT_READ_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );

    /// 着色器只读采样（片段着色器）
    pub const SHADER_READ_FRAGMENT: Self = Self::new(
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::AccessFlags2::SHADER_READ,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    );

    /// 存储图像只读（计算着色器）
    pub const STORAGE_READ_COMPUTE: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::SHADER_READ,
        vk::ImageLayout::GENERAL,
    );

    /// 存储图像读写（计算着色器）
    pub const STORAGE_READ_WRITE_COMPUTE: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::from_raw(vk::AccessFlags2::SHADER_READ.as_raw() | vk::AccessFlags2::SHADER_WRITE.as_raw()),
        vk::ImageLayout::GENERAL,
    );

    /// 传输源
    pub const TRANSFER_SRC: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    );

    /// 传输目标
    pub const TRANSFER_DST: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );

    /// 呈现（swapchain image）
    pub const PRESENT: Self =
        Self::new(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::PRESENT_SRC_KHR);

    // ============ 辅助方法 ============

    /// 写操作的 access flags
    const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_WRITE.as_raw()
            | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
    );

    /// 检查是否为写操作
    #[inline]
    pub fn is_write(&self) -> bool {
        self.access.intersects(Self::WRITE_ACCESS)
    }

    /// 获取用于 barrier src 的 access（只保留写操作）
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access & Self::WRITE_ACCESS
    }

    /// image 在 pass 中以 `usage` 方式使用时需要的状态
    ///
    /// compute pass 的 hint 只影响 storage 用法：stage 覆盖默认值，access 追加到默认值上。
    pub fn from_usage(usage: &ImageUsage, stage_hint: Option<vk::PipelineStageFlags2>, access_hint: Option<vk::AccessFlags2>) -> Self {
        let with_hints = |state: Self| Self {
            stage: stage_hint.unwrap_or(state.stage),
            access: state.access | access_hint.unwrap_or(vk::AccessFlags2::NONE),
            layout: state.layout,
        };

        match usage {
            ImageUsage::ColorAttachment { load_op, .. } if *load_op == vk::AttachmentLoadOp::LOAD => {
                Self::COLOR_ATTACHMENT_READ_WRITE
            }
            ImageUsage::ColorAttachment { .. } => Self::COLOR_ATTACHMENT_WRITE,
            ImageUsage::DepthStencilAttachment { .. } => Self::DEPTH_ATTACHMENT_READ_WRITE,
            ImageUsage::Sampled => Self::SHADER_READ_FRAGMENT,
            ImageUsage::StorageReadOnly => with_hints(Self::STORAGE_READ_COMPUTE),
            ImageUsage::StorageReadWrite => with_hints(Self::STORAGE_READ_WRITE_COMPUTE),
        }
    }

    /// 同一 pass 对同一 image 的多种用法合并为一个状态
    ///
    /// layout 不一致时退化为 `GENERAL`。
    pub fn merge(self, other: Self) -> Self {
        let layout = if self.layout == other.layout { self.layout } else { vk::ImageLayout::GENERAL };
        Self {
            stage: self.stage | other.stage,
            access: self.access | other.access,
            layout,
        }
    }

    /// 从 `self` 转换到 `next` 是否需要 barrier
    ///
    /// layout 不同或任意一方有写操作时需要；同 layout 的只读到只读可以跳过。
    #[inline]
    pub fn needs_barrier_to(&self, next: &Self) -> bool {
        self.layout != next.layout || self.is_write() || next.is_write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_attachment_state_depends_on_load_op() {
        let clear = ImageUsage::ColorAttachment {
            load_op: vk::AttachmentLoadOp::CLEAR,
            clear: Some([0.0; 4]),
        };
        let load = ImageUsage::ColorAttachment {
            load_op: vk::AttachmentLoadOp::LOAD,
            clear: None,
        };
        assert_eq!(RgImageState::from_usage(&clear, None, None), RgImageState::COLOR_ATTACHMENT_WRITE);
        assert_eq!(RgImageState::from_usage(&load, None, None), RgImageState::COLOR_ATTACHMENT_READ_WRITE);
    }

    #[test]
    fn compute_hints_apply_to_storage_only() {
        let stage = Some(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR);
        let access = Some(vk::AccessFlags2::SHADER_STORAGE_READ);

        let storage = RgImageState::from_usage(&ImageUsage::StorageReadOnly, stage, access);
        assert_eq!(storage.stage, vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR);
        assert!(storage.access.contains(vk::AccessFlags2::SHADER_READ | vk::AccessFlags2::SHADER_STORAGE_READ));
        assert_eq!(storage.layout, vk::ImageLayout::GENERAL);

        let sampled = RgImageState::from_usage(&ImageUsage::Sampled, stage, access);
        assert_eq!(sampled, RgImageState::SHADER_READ_FRAGMENT);
    }

    #[test]
    fn src_access_keeps_write_bits_only() {
        assert_eq!(RgImageState::COLOR_ATTACHMENT_READ_WRITE.src_access(), vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(RgImageState::SHADER_READ_FRAGMENT.src_access(), vk::AccessFlags2::NONE);
        assert_eq!(RgImageState::STORAGE_READ_WRITE_COMPUTE.src_access(), vk::AccessFlags2::SHADER_WRITE);
    }

    #[test]
    fn merge_falls_back_to_general() {
        let merged = RgImageState::COLOR_ATTACHMENT_WRITE.merge(RgImageState::SHADER_READ_FRAGMENT);
        assert_eq!(merged.layout, vk::ImageLayout::GENERAL);
        assert!(merged.is_write());

        let same = RgImageState::STORAGE_READ_COMPUTE.merge(RgImageState::STORAGE_READ_WRITE_COMPUTE);
        assert_eq!(same.layout, vk::ImageLayout::GENERAL);
        assert_eq!(same.access, RgImageState::STORAGE_READ_WRITE_COMPUTE.access);
    }

    #[test]
    fn read_to_read_skips_barrier() {
        let sampled = RgImageState::SHADER_READ_FRAGMENT;
        assert!(!sampled.needs_barrier_to(&sampled));
        assert!(RgImageState::COLOR_ATTACHMENT_WRITE.needs_barrier_to(&sampled));
        assert!(RgImageState::UNDEFINED.needs_barrier_to(&sampled));
    }
}
