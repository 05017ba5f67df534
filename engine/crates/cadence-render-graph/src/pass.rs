//! Pass 定义：声明阶段的句柄、执行阶段的 scope，以及 image 用法
//!
//! 声明句柄（[`RgGraphicsPass`] / [`RgComputePass`]）只在声明阶段存在；
//! 回调拿到的是 scope，无法再声明新的用法。

use std::collections::HashMap;

use ash::vk;
use cadence_gfx::{GfxCommandList, ImageHandle};

use crate::{
    component::ComponentId,
    dependency,
    graph::{GraphDecl, RenderGraph},
    image::{GraphImage, ImageId},
    storage::{GraphStorage, StorageKey},
};

/// pass 对 image 的一种用法
#[derive(Clone, Copy, Debug)]
pub enum ImageUsage {
    ColorAttachment {
        load_op: vk::AttachmentLoadOp,
        clear: Option<[f32; 4]>,
    },
    DepthStencilAttachment {
        load_op: vk::AttachmentLoadOp,
        clear: Option<vk::ClearDepthStencilValue>,
    },
    Sampled,
    StorageReadOnly,
    StorageReadWrite,
}

impl ImageUsage {
    /// attachment 与 storage 写入都算写
    #[inline]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ImageUsage::ColorAttachment { .. } | ImageUsage::DepthStencilAttachment { .. } | ImageUsage::StorageReadWrite
        )
    }

    #[inline]
    pub fn is_attachment(&self) -> bool {
        matches!(self, ImageUsage::ColorAttachment { .. } | ImageUsage::DepthStencilAttachment { .. })
    }

    #[inline]
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// 物理 image 需要的 usage flag
    pub fn native_usage(&self) -> vk::ImageUsageFlags {
        match self {
            ImageUsage::ColorAttachment { .. } => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            ImageUsage::DepthStencilAttachment { .. } => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ImageUsage::Sampled => vk::ImageUsageFlags::SAMPLED,
            ImageUsage::StorageReadOnly | ImageUsage::StorageReadWrite => vk::ImageUsageFlags::STORAGE,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ImageUsage::ColorAttachment { .. } => "color",
            ImageUsage::DepthStencilAttachment { .. } => "depth-stencil",
            ImageUsage::Sampled => "sampled",
            ImageUsage::StorageReadOnly => "storage-read",
            ImageUsage::StorageReadWrite => "storage-read-write",
        }
    }
}

/// graphics pass 的创建信息
#[derive(Clone, Debug)]
pub struct GraphicsPassInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub samples: vk::SampleCountFlags,
}

impl GraphicsPassInfo {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }
}

/// compute pass 的创建信息
///
/// compute pass 没有 render pass 描述可供推断，stage / access 由调用者提示。
#[derive(Clone, Debug)]
pub struct ComputePassInfo {
    pub name: String,
    pub stage: Option<vk::PipelineStageFlags2>,
    pub access: Option<vk::AccessFlags2>,
}

impl ComputePassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: None,
            access: None,
        }
    }

    #[inline]
    pub fn with_hints(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.stage = Some(stage);
        self.access = Some(access);
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum PassType {
    Graphics {
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    },
    Compute {
        stage_hint: Option<vk::PipelineStageFlags2>,
        access_hint: Option<vk::AccessFlags2>,
    },
}

pub(crate) struct PassNode {
    pub name: String,
    pub component: ComponentId,
    pub ty: PassType,
    /// 按声明顺序排列
    pub usages: Vec<(ImageId, ImageUsage)>,
}

impl PassNode {
    pub fn usages_of(&self, image: ImageId) -> impl Iterator<Item = &ImageUsage> {
        self.usages.iter().filter(move |(id, _)| *id == image).map(|(_, usage)| usage)
    }
}

pub(crate) type GraphicsCallback<'a> = Box<dyn FnOnce(&GraphicsPassScope, &mut dyn GfxCommandList) + 'a>;
pub(crate) type ComputeCallback<'a> = Box<dyn FnOnce(&ComputePassScope, &mut dyn GfxCommandList) + 'a>;

pub(crate) enum PassCallback<'a> {
    Graphics(GraphicsCallback<'a>),
    Compute(ComputeCallback<'a>),
}

// ============ 声明阶段 ============

fn declare_usage(graph: &mut RenderGraph, pass: usize, image: GraphImage, usage: ImageUsage) {
    let decl = &mut graph.decl;
    let node = &decl.passes[pass];
    let component_name = &decl.components[node.component.0].name;

    let Some(image_node) = decl.images.get(image.id) else {
        panic!("pass \"{}\": image handle does not belong to this frame", node.name);
    };
    if image_node.component != node.component {
        panic!(
            "pass \"{}\": image \"{}\" is not declared in component \"{}\"",
            node.name, image_node.name, component_name
        );
    }
    for existing in node.usages_of(image.id) {
        if existing.same_kind(&usage) {
            panic!(
                "pass \"{}\": image \"{}\" is already used as {}",
                node.name,
                image_node.name,
                usage.kind_name()
            );
        }
        if existing.is_write() && usage.is_write() {
            panic!(
                "pass \"{}\": image \"{}\" has conflicting write usages ({} and {})",
                node.name,
                image_node.name,
                existing.kind_name(),
                usage.kind_name()
            );
        }
    }

    decl.passes[pass].usages.push((image.id, usage));
}

fn check_load_op_clear_value<T>(pass: &str, load_op: vk::AttachmentLoadOp, clear: &Option<T>) {
    match (load_op == vk::AttachmentLoadOp::CLEAR, clear.is_some()) {
        (true, false) => panic!("pass \"{pass}\": load op CLEAR requires a clear value"),
        (false, true) => panic!("pass \"{pass}\": clear value given with load op {load_op:?}"),
        _ => {}
    }
}

/// graphics pass 的声明句柄
pub struct RgGraphicsPass<'c, 'a> {
    pub(crate) graph: &'c mut RenderGraph<'a>,
    pub(crate) pass: usize,
}

impl RgGraphicsPass<'_, '_> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.graph.decl.passes[self.pass].name
    }

    /// 作为 color attachment 写入；load op 按调用者的声明原样使用
    pub fn use_color_attachment(
        &mut self,
        image: GraphImage,
        load_op: vk::AttachmentLoadOp,
        clear: Option<[f32; 4]>,
    ) -> &mut Self {
        check_load_op_clear_value(self.name(), load_op, &clear);
        declare_usage(self.graph, self.pass, image, ImageUsage::ColorAttachment { load_op, clear });
        self
    }

    pub fn use_depth_stencil_attachment(
        &mut self,
        image: GraphImage,
        load_op: vk::AttachmentLoadOp,
        clear: Option<vk::ClearDepthStencilValue>,
    ) -> &mut Self {
        check_load_op_clear_value(self.name(), load_op, &clear);
        let has_depth = self.graph.decl.passes[self.pass]
            .usages
            .iter()
            .any(|(_, usage)| matches!(usage, ImageUsage::DepthStencilAttachment { .. }));
        if has_depth {
            panic!("pass \"{}\": only one depth-stencil attachment is allowed", self.name());
        }
        declare_usage(self.graph, self.pass, image, ImageUsage::DepthStencilAttachment { load_op, clear });
        self
    }

    /// 在 fragment shader 中采样
    pub fn use_image_sampled(&mut self, image: GraphImage) -> &mut Self {
        declare_usage(self.graph, self.pass, image, ImageUsage::Sampled);
        self
    }
}

/// compute pass 的声明句柄
pub struct RgComputePass<'c, 'a> {
    pub(crate) graph: &'c mut RenderGraph<'a>,
    pub(crate) pass: usize,
}

impl RgComputePass<'_, '_> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.graph.decl.passes[self.pass].name
    }

    pub fn use_image_storage_read_only(&mut self, image: GraphImage) -> &mut Self {
        declare_usage(self.graph, self.pass, image, ImageUsage::StorageReadOnly);
        self
    }

    pub fn use_image_storage_read_write(&mut self, image: GraphImage) -> &mut Self {
        declare_usage(self.graph, self.pass, image, ImageUsage::StorageReadWrite);
        self
    }
}

// ============ 执行阶段 ============

/// 回调中查询物理 image 的上下文
///
/// 每次查询都重新沿引用链解析并查找 storage，不做缓存。
pub(crate) struct ImageLookup<'s> {
    pub decl: &'s GraphDecl,
    pub links: &'s HashMap<ImageId, ImageId>,
    pub storage: &'s GraphStorage,
}

impl ImageLookup<'_> {
    fn get_image(&self, image: GraphImage) -> Option<ImageHandle> {
        self.decl.images.get(image.id)?;
        let owner = dependency::resolve_owner(self.decl, self.links, image.id).ok()?;
        let key = StorageKey::of(self.decl, owner);
        self.storage.handle(&key)
    }
}

/// graphics pass 回调的执行上下文
pub struct GraphicsPassScope<'s> {
    pub(crate) name: &'s str,
    pub(crate) extent: vk::Extent2D,
    pub(crate) frame_index: usize,
    pub(crate) lookup: ImageLookup<'s>,
}

impl GraphicsPassScope<'_> {
    #[inline]
    pub fn name(&self) -> &str {
        self.name
    }

    /// render area
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// 获取图像的物理句柄；Input / IO 会解析到上游的物理 image
    #[inline]
    pub fn get_image(&self, image: GraphImage) -> Option<ImageHandle> {
        self.lookup.get_image(image)
    }
}

/// compute pass 回调的执行上下文
pub struct ComputePassScope<'s> {
    pub(crate) name: &'s str,
    pub(crate) frame_index: usize,
    pub(crate) lookup: ImageLookup<'s>,
}

impl ComputePassScope<'_> {
    #[inline]
    pub fn name(&self) -> &str {
        self.name
    }

    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// 获取图像的物理句柄；Input / IO 会解析到上游的物理 image
    #[inline]
    pub fn get_image(&self, image: GraphImage) -> Option<ImageHandle> {
        self.lookup.get_image(image)
    }
}
