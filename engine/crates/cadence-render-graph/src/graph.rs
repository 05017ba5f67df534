//! 帧图：每帧声明、编译并提交
//!
//! 一帧的生命周期：
//!
//! 1. [`RenderGraph::new`] 拿到设备、命令列表与持久化的 [`GraphStorage`]
//! 2. 各个渲染功能通过 [`RenderGraph::add_component`] 声明 image 与 pass，
//!    并用 `connect_*` 记录 component 之间的连接
//! 3. [`RenderGraph::submit`] 编译、分配物理 image、录制并提交，随后帧图被消费

use std::collections::HashMap;

use ash::vk;
use cadence_crate_tools::profile_scope;
use cadence_gfx::{
    GfxCommandList, GfxDevice, GfxFormatUtils, GfxImageCreateInfo, GfxSemaphoreInfo, GfxSubmitInfo, ImageHandle,
};
use slotmap::SlotMap;

use crate::{
    barrier::{self, PresentRequest},
    component::{ComponentId, ComponentNode, RgComponent},
    dependency::{self, ImageResolution},
    error::{RenderGraphError, RenderGraphResult},
    executor::FrameRecorder,
    image::{ImageId, ImageKind, ImageNode},
    pass::{PassCallback, PassNode},
    plan::{FramePlan, PhysicalImage},
    settings::RenderGraphSettings,
    storage::{GraphStorage, StorageKey},
};

/// 窗口 id，用于把 image 连接到对应的 swapchain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

/// 某个窗口本帧的 swapchain 信息
#[derive(Clone, Copy, Debug)]
pub struct GraphSwapchainInfo {
    pub window: WindowId,
    /// 本帧 acquire 到的 swapchain image
    pub image: ImageHandle,
    pub extent: vk::Extent2D,
    /// acquire 完成时 signal；为 null 时不等待
    pub image_acquired: vk::Semaphore,
    /// 提交完成时 signal，present 等待它；为 null 时不 signal
    pub present_ready: vk::Semaphore,
}

/// 构建一帧帧图所需的外部上下文
pub struct GraphInfo<'a> {
    pub device: &'a mut dyn GfxDevice,
    /// 帧图在其上录制；由调用者创建，submit 时 begin / end
    pub command_list: &'a mut dyn GfxCommandList,
    pub storage: &'a mut GraphStorage,
    /// 本帧 GPU 执行完毕时 signal
    pub frame_fence: Option<vk::Fence>,
    pub swapchains: Vec<GraphSwapchainInfo>,
    pub screen_extent: vk::Extent2D,
    pub settings: RenderGraphSettings,
}

pub(crate) struct ImageConnection {
    pub src_component: String,
    pub src_image: String,
    pub dst_component: String,
    pub dst_image: String,
}

pub(crate) struct SwapchainConnection {
    pub component: String,
    pub image: String,
    pub window: WindowId,
}

/// 声明阶段收集到的全部信息，不含回调
#[derive(Default)]
pub(crate) struct GraphDecl {
    pub components: Vec<ComponentNode>,
    pub component_lookup: HashMap<String, ComponentId>,
    pub images: SlotMap<ImageId, ImageNode>,
    /// 全局声明顺序
    pub passes: Vec<PassNode>,
    pub connections: Vec<ImageConnection>,
    pub swapchain_connections: Vec<SwapchainConnection>,
}

type DestroyCallback<'a> = Box<dyn FnOnce() + 'a>;

pub struct RenderGraph<'a> {
    info: GraphInfo<'a>,

    pub(crate) decl: GraphDecl,
    /// 与 `decl.passes` 一一对应，录制时取出
    pub(crate) callbacks: Vec<Option<PassCallback<'a>>>,
    destroy_callbacks: Vec<DestroyCallback<'a>>,
}

// new & init
impl<'a> RenderGraph<'a> {
    pub fn new(info: GraphInfo<'a>) -> Self {
        Self {
            info,
            decl: GraphDecl::default(),
            callbacks: vec![],
            destroy_callbacks: vec![],
        }
    }

    /// 声明一个 component
    ///
    /// # Panics
    /// 同名 component 已存在
    pub fn add_component(&mut self, name: &str) -> RgComponent<'_, 'a> {
        if self.decl.component_lookup.contains_key(name) {
            panic!("component \"{}\" is already declared", name);
        }

        let id = ComponentId(self.decl.components.len());
        self.decl.components.push(ComponentNode::new(name));
        self.decl.component_lookup.insert(name.to_string(), id);
        RgComponent { graph: self, id }
    }

    /// 重新打开已声明的 component
    pub fn component(&mut self, name: &str) -> Option<RgComponent<'_, 'a>> {
        let id = *self.decl.component_lookup.get(name)?;
        Some(RgComponent { graph: self, id })
    }

    /// 把 `src_component` 的 Output / IO 连接到 `dst_component` 的 Input / IO
    ///
    /// 只记录连接，解析推迟到 compile，因此允许引用之后才声明的 component。
    pub fn connect_image(&mut self, src_component: &str, src_output: &str, dst_component: &str, dst_input: &str) {
        self.decl.connections.push(ImageConnection {
            src_component: src_component.to_string(),
            src_image: src_output.to_string(),
            dst_component: dst_component.to_string(),
            dst_image: dst_input.to_string(),
        });
    }

    /// 所有 pass 之后把 image blit 到 `window` 的 swapchain
    pub fn connect_swapchain_image(&mut self, component: &str, output: &str, window: WindowId) {
        self.decl.swapchain_connections.push(SwapchainConnection {
            component: component.to_string(),
            image: output.to_string(),
            window,
        });
    }

    /// submit 之后按注册的逆序调用
    pub fn add_destroy_callback(&mut self, callback: impl FnOnce() + 'a) {
        self.destroy_callbacks.push(Box::new(callback));
    }
}

// getters
impl RenderGraph<'_> {
    #[inline]
    pub fn get_screen_extent(&self) -> vk::Extent2D {
        self.info.screen_extent
    }

    #[inline]
    pub fn device(&mut self) -> &mut dyn GfxDevice {
        &mut *self.info.device
    }

    #[inline]
    pub fn settings(&self) -> &RenderGraphSettings {
        &self.info.settings
    }
}

// compile
impl RenderGraph<'_> {
    /// 解析引用、排序并计算同步，不访问设备
    ///
    /// 返回的 [`FramePlan`] 与 submit 时录制的完全一致。
    pub fn compile(&mut self) -> RenderGraphResult<FramePlan> {
        profile_scope!("RenderGraph::compile");

        let resolution = dependency::resolve_images(&self.decl)?;
        self.inherit_image_properties(&resolution);
        let presents = self.resolve_swapchain_connections(&resolution)?;

        let (mut images, owner_index) = self.collect_physical_images(&resolution, &presents);

        let dep_graph = dependency::build_dependency_graph(&self.decl, &resolution);
        let order = dep_graph.topological_sort().map_err(|remaining| RenderGraphError::CyclicDependency {
            passes: remaining
                .iter()
                .map(|&index| {
                    let pass = &self.decl.passes[index];
                    format!("{}.{}", self.decl.components[pass.component.0].name, pass.name)
                })
                .collect(),
        })?;

        let present_requests = presents
            .iter()
            .map(|(owner, swapchain)| PresentRequest {
                window: swapchain.window.0,
                image: owner_index[owner],
                swapchain_image: swapchain.image,
                swapchain_extent: swapchain.extent,
            })
            .collect::<Vec<_>>();

        let (passes, presents) = barrier::synthesize(
            &self.decl,
            &owner_index,
            &order,
            &mut images,
            &present_requests,
            self.info.settings.fold_attachment_transitions,
        );

        Ok(FramePlan {
            images,
            passes,
            edges: dep_graph.edges().to_vec(),
            presents,
            links: resolution.links,
        })
    }

    /// Input / IO 从拥有物理资源的上游继承 format、尺寸与 sampler
    fn inherit_image_properties(&mut self, resolution: &ImageResolution) {
        let inherited = self
            .decl
            .images
            .iter()
            .filter(|(_, node)| !node.kind.is_owner())
            .map(|(id, _)| {
                let owner = &self.decl.images[resolution.owners[id]];
                (id, owner.format, owner.width, owner.height, owner.sampler)
            })
            .collect::<Vec<_>>();

        for (id, format, width, height, sampler) in inherited {
            let component = self.decl.components[self.decl.images[id].component.0].name.clone();
            let node = &mut self.decl.images[id];
            if node.format != vk::Format::UNDEFINED && node.format != format {
                log::warn!(
                    "image {}.{} declared as {:?} but its source is {:?}",
                    component,
                    node.name,
                    node.format,
                    format
                );
            }
            if (node.width, node.height) != (0, 0) && (node.width, node.height) != (width, height) {
                log::warn!(
                    "image {}.{} declared as {}x{} but its source is {}x{}",
                    component,
                    node.name,
                    node.width,
                    node.height,
                    width,
                    height
                );
            }
            node.format = format;
            node.width = width;
            node.height = height;
            node.sampler = sampler;
        }
    }

    /// 返回每个 swapchain 连接的物理 owner 与目标 swapchain
    fn resolve_swapchain_connections(
        &self,
        resolution: &ImageResolution,
    ) -> RenderGraphResult<Vec<(ImageId, GraphSwapchainInfo)>> {
        self.decl
            .swapchain_connections
            .iter()
            .map(|connection| {
                let image = dependency::lookup_image(&self.decl, &connection.component, &connection.image)?;
                if !self.decl.images[image].kind.is_connect_source() {
                    return Err(RenderGraphError::InvalidConnection {
                        src: format!("{}.{}", connection.component, connection.image),
                        dst: format!("window {}", connection.window.0),
                        reason: "source is not an Output or IO image".to_string(),
                    });
                }
                let swapchain = self
                    .info
                    .swapchains
                    .iter()
                    .find(|swapchain| swapchain.window == connection.window)
                    .ok_or(RenderGraphError::UnknownWindow(connection.window.0))?;
                Ok((resolution.owners[image], *swapchain))
            })
            .collect()
    }

    /// 收集本帧真正被使用的 owner image，usage 取所有别名的并集
    ///
    /// 返回物理 image 表，以及每个 image（含 Input / IO 别名）到物理 image 索引的映射。
    fn collect_physical_images(
        &self,
        resolution: &ImageResolution,
        presents: &[(ImageId, GraphSwapchainInfo)],
    ) -> (Vec<PhysicalImage>, HashMap<ImageId, usize>) {
        let mut usages: HashMap<ImageId, vk::ImageUsageFlags> = HashMap::new();
        for pass in &self.decl.passes {
            for (image, usage) in &pass.usages {
                *usages.entry(resolution.owners[*image]).or_default() |= usage.native_usage();
            }
        }
        for (owner, _) in presents {
            *usages.entry(*owner).or_default() |= vk::ImageUsageFlags::TRANSFER_SRC;
        }

        let mut images = vec![];
        let mut physical_of_owner = HashMap::new();
        for (id, node) in self.decl.images.iter() {
            let Some(&usage) = usages.get(&id) else {
                continue;
            };
            debug_assert!(node.kind.is_owner());

            let key = StorageKey::of(&self.decl, id);
            let required = GfxImageCreateInfo::new_2d(node.format, node.extent(), usage).with_sampler(node.sampler);
            let create_info = self.info.storage.generalize(&key, &required);
            let initial_state = self.info.storage.peek_state(&key, &create_info);

            physical_of_owner.insert(id, images.len());
            images.push(PhysicalImage {
                key,
                create_info,
                declared_extent: node.extent(),
                aspect: GfxFormatUtils::aspect(node.format),
                initial_state,
                final_state: initial_state,
            });
        }

        let owner_index = resolution
            .owners
            .iter()
            .filter_map(|(id, owner)| physical_of_owner.get(owner).map(|&index| (id, index)))
            .collect();

        (images, owner_index)
    }
}

// submit
impl RenderGraph<'_> {
    /// 编译、分配物理 image、录制并提交本帧
    ///
    /// `save` 为 true 时把排序后的帧图以 dot 格式写到 `settings.dot_path`。
    /// 无论成功与否，destroy 回调都会按注册的逆序执行。
    pub fn submit(mut self, save: bool) -> RenderGraphResult<()> {
        profile_scope!("RenderGraph::submit");

        let result = self.execute(save);
        while let Some(callback) = self.destroy_callbacks.pop() {
            callback();
        }
        result
    }

    fn execute(&mut self, save: bool) -> RenderGraphResult<()> {
        let plan = self.compile()?;

        if save {
            let path = &self.info.settings.dot_path;
            match plan.save_dot(path) {
                Ok(()) => log::info!("render graph saved to {}", path.display()),
                Err(err) => log::error!("failed to save render graph to {}: {}", path.display(), err),
            }
        }
        if self.info.settings.log_execution_plan {
            plan.print_execution_plan();
        }

        // 录制之前分配全部物理 image，失败时不录制任何命令
        let mut handles = Vec::with_capacity(plan.images.len());
        for image in &plan.images {
            handles.push(self.info.storage.get_or_create(&mut *self.info.device, &image.key, &image.create_info)?);
        }

        let recorder = FrameRecorder {
            decl: &self.decl,
            plan: &plan,
            storage: &*self.info.storage,
            handles: &handles,
            frame_index: self.info.device.frame_index(),
        };
        recorder.record(&mut *self.info.command_list, &mut self.callbacks)?;

        for image in &plan.images {
            self.info.storage.set_state(&image.key, image.final_state);
        }

        let mut submit_info = GfxSubmitInfo::new(&[self.info.command_list.vk_handle()]);
        for swapchain in &self.info.swapchains {
            if swapchain.image_acquired != vk::Semaphore::null() {
                submit_info = submit_info.wait(GfxSemaphoreInfo::binary(
                    swapchain.image_acquired,
                    vk::PipelineStageFlags2::TRANSFER | vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                ));
            }
            if swapchain.present_ready != vk::Semaphore::null() {
                submit_info = submit_info
                    .signal(GfxSemaphoreInfo::binary(swapchain.present_ready, vk::PipelineStageFlags2::ALL_COMMANDS));
            }
        }
        if let Some(fence) = self.info.frame_fence {
            submit_info = submit_info.fence(fence);
        }
        self.info.device.submit(&submit_info)?;
        Ok(())
    }
}
