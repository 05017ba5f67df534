//! 帧图中的 image 声明
//!
//! image 只是声明，不占用显存：Private / Output 由 [`GraphStorage`](crate::GraphStorage)
//! 提供物理资源，Input / IO 是对其他 component 中 Output / IO 的弱引用。

use ash::vk;
use cadence_gfx::GfxSamplerDesc;
use slotmap::new_key_type;

use crate::component::ComponentId;

new_key_type! {
    /// 帧图内部的 image 节点 id
    pub struct ImageId;
}

/// image 节点的类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// 只在本 component 内使用
    Private,
    /// 由本 component 产生，可以连接到其他 component 的 Input / IO
    Output,
    /// 引用其他 component 的 Output / IO
    Input,
    /// 引用上游 image，修改后继续向下游输出
    IO,
}

impl ImageKind {
    /// 是否拥有物理资源
    #[inline]
    pub fn is_owner(self) -> bool {
        matches!(self, ImageKind::Private | ImageKind::Output)
    }

    /// 能否作为 connect 的源
    #[inline]
    pub fn is_connect_source(self) -> bool {
        matches!(self, ImageKind::Output | ImageKind::IO)
    }

    /// 能否作为 connect 的目标
    #[inline]
    pub fn is_connect_target(self) -> bool {
        matches!(self, ImageKind::Input | ImageKind::IO)
    }
}

/// 暴露给调用者的 image 句柄，只在声明它的那一帧有效
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphImage {
    pub(crate) id: ImageId,
}

impl GraphImage {
    #[inline]
    pub fn id(&self) -> ImageId {
        self.id
    }
}

pub(crate) struct ImageNode {
    pub name: String,
    pub component: ComponentId,
    pub kind: ImageKind,
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub sampler: Option<GfxSamplerDesc>,
}

impl ImageNode {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}
