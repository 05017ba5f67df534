//! Component：一个渲染功能在当前帧声明的 image 与 pass 的命名空间

use std::collections::HashMap;

use ash::vk;
use cadence_gfx::{GfxCommandList, GfxSamplerDesc};

use crate::{
    graph::RenderGraph,
    image::{GraphImage, ImageId, ImageKind, ImageNode},
    pass::{
        ComputePassInfo, ComputePassScope, GraphicsPassInfo, GraphicsPassScope, PassCallback, PassNode, PassType,
        RgComputePass, RgGraphicsPass,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) usize);

pub(crate) struct ComponentNode {
    pub name: String,
    pub images: HashMap<String, ImageId>,
    /// 按声明顺序排列的 pass（全局 pass 索引）
    pub passes: Vec<usize>,
}

impl ComponentNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            images: HashMap::new(),
            passes: vec![],
        }
    }
}

/// component 的声明句柄
///
/// 由 [`RenderGraph::add_component`] 或 [`RenderGraph::component`] 得到，只能在声明阶段使用。
pub struct RgComponent<'g, 'a> {
    pub(crate) graph: &'g mut RenderGraph<'a>,
    pub(crate) id: ComponentId,
}

// getters
impl RgComponent<'_, '_> {
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.graph.decl.components[self.id.0].name
    }

    /// 按名字查找本 component 中已声明的 image
    pub fn image(&self, name: &str) -> Option<GraphImage> {
        self.graph.decl.components[self.id.0].images.get(name).map(|&id| GraphImage { id })
    }
}

// image 声明
impl<'a> RgComponent<'_, 'a> {
    /// 只在本 component 内部使用的 image
    pub fn add_private_image(
        &mut self,
        name: &str,
        format: vk::Format,
        width: u32,
        height: u32,
        sampler: Option<GfxSamplerDesc>,
    ) -> GraphImage {
        self.add_image(ImageKind::Private, name, format, width, height, sampler)
    }

    /// 可以连接到其他 component 的 image
    pub fn add_output_image(
        &mut self,
        name: &str,
        format: vk::Format,
        width: u32,
        height: u32,
        sampler: Option<GfxSamplerDesc>,
    ) -> GraphImage {
        self.add_image(ImageKind::Output, name, format, width, height, sampler)
    }

    /// 引用上游 component 的 image，format / 尺寸 / sampler 在解析时从上游继承
    pub fn add_input_image(&mut self, name: &str, format: vk::Format, width: u32, height: u32) -> GraphImage {
        self.add_image(ImageKind::Input, name, format, width, height, None)
    }

    /// 引用上游 image 并继续向下游输出
    pub fn add_io_image(&mut self, name: &str, format: vk::Format, width: u32, height: u32) -> GraphImage {
        self.add_image(ImageKind::IO, name, format, width, height, None)
    }

    fn add_image(
        &mut self,
        kind: ImageKind,
        name: &str,
        format: vk::Format,
        width: u32,
        height: u32,
        sampler: Option<GfxSamplerDesc>,
    ) -> GraphImage {
        let decl = &mut self.graph.decl;
        let component = &decl.components[self.id.0];
        if component.images.contains_key(name) {
            panic!("image \"{}\" is already declared in component \"{}\"", name, component.name);
        }

        let id = decl.images.insert(ImageNode {
            name: name.to_string(),
            component: self.id,
            kind,
            format,
            width,
            height,
            sampler,
        });
        decl.components[self.id.0].images.insert(name.to_string(), id);
        GraphImage { id }
    }
}

// pass 声明
impl<'a> RgComponent<'_, 'a> {
    /// 声明一个 graphics pass
    ///
    /// `callback` 在 submit 回放到该 pass 时调用，是调用者录制 draw 命令的唯一时机。
    pub fn add_graphics_pass<F>(&mut self, info: GraphicsPassInfo, callback: F) -> RgGraphicsPass<'_, 'a>
    where
        F: FnOnce(&GraphicsPassScope, &mut dyn GfxCommandList) + 'a,
    {
        let pass = self.add_pass(
            &info.name,
            PassType::Graphics {
                extent: vk::Extent2D {
                    width: info.width,
                    height: info.height,
                },
                samples: info.samples,
            },
            PassCallback::Graphics(Box::new(callback)),
        );
        RgGraphicsPass {
            graph: &mut *self.graph,
            pass,
        }
    }

    /// 声明一个 compute pass
    pub fn add_compute_pass<F>(&mut self, info: ComputePassInfo, callback: F) -> RgComputePass<'_, 'a>
    where
        F: FnOnce(&ComputePassScope, &mut dyn GfxCommandList) + 'a,
    {
        let pass = self.add_pass(
            &info.name,
            PassType::Compute {
                stage_hint: info.stage,
                access_hint: info.access,
            },
            PassCallback::Compute(Box::new(callback)),
        );
        RgComputePass {
            graph: &mut *self.graph,
            pass,
        }
    }

    fn add_pass(&mut self, name: &str, ty: PassType, callback: PassCallback<'a>) -> usize {
        let component = &self.graph.decl.components[self.id.0];
        let duplicated = component.passes.iter().any(|&pass| self.graph.decl.passes[pass].name == name);
        if duplicated {
            panic!("pass \"{}\" is already declared in component \"{}\"", name, component.name);
        }

        let index = self.graph.decl.passes.len();
        self.graph.decl.passes.push(PassNode {
            name: name.to_string(),
            component: self.id,
            ty,
            usages: vec![],
        });
        self.graph.callbacks.push(Some(callback));
        self.graph.decl.components[self.id.0].passes.push(index);
        index
    }
}
