//! 集成测试共用的 headless 帧环境

#![allow(dead_code)]

use ash::vk::{self, Handle};
use cadence_gfx::{GfxDevice, ImageHandle, headless::HeadlessDevice};
use cadence_render_graph::{
    FramePlan, GraphInfo, GraphStorage, GraphSwapchainInfo, RenderGraph, RenderGraphResult, RenderGraphSettings,
    WindowId,
};

pub const RGBA8: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[inline]
pub fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

/// 一个 headless 设备加上跨帧持久的 storage
pub struct Harness {
    pub device: HeadlessDevice,
    pub storage: GraphStorage,
    pub settings: RenderGraphSettings,
    pub swapchains: Vec<GraphSwapchainInfo>,
    pub fence: vk::Fence,
}

impl Harness {
    pub fn new() -> Self {
        init_logger();
        Self {
            device: HeadlessDevice::default(),
            storage: GraphStorage::new(),
            settings: RenderGraphSettings::default(),
            swapchains: vec![],
            fence: vk::Fence::from_raw(0x42),
        }
    }

    /// 为窗口创建一个模拟的 swapchain image
    pub fn add_window(&mut self, window: u32, size: vk::Extent2D) -> ImageHandle {
        let image = self.device.create_swapchain_image(&format!("swapchain {window}"), size, vk::Format::B8G8R8A8_UNORM);
        self.swapchains.push(GraphSwapchainInfo {
            window: WindowId(window),
            image,
            extent: size,
            image_acquired: vk::Semaphore::null(),
            present_ready: vk::Semaphore::null(),
        });
        image
    }

    /// 声明一帧并提交
    pub fn run_frame(&mut self, declare: impl FnOnce(&mut RenderGraph)) -> RenderGraphResult<()> {
        self.run_frame_with_save(false, declare)
    }

    pub fn run_frame_with_save(
        &mut self,
        save: bool,
        declare: impl FnOnce(&mut RenderGraph),
    ) -> RenderGraphResult<()> {
        let mut cmd = self.device.create_command_list("frame").expect("create command list");
        let mut graph = RenderGraph::new(GraphInfo {
            device: &mut self.device,
            command_list: cmd.as_mut(),
            storage: &mut self.storage,
            frame_fence: Some(self.fence),
            swapchains: self.swapchains.clone(),
            screen_extent: extent(256, 256),
            settings: self.settings.clone(),
        });
        declare(&mut graph);
        let result = graph.submit(save);
        self.device.advance_frame();
        result
    }

    /// 声明一帧并只编译，不录制
    pub fn compile(&mut self, declare: impl FnOnce(&mut RenderGraph)) -> RenderGraphResult<FramePlan> {
        let mut cmd = self.device.create_command_list("compile").expect("create command list");
        let mut graph = RenderGraph::new(GraphInfo {
            device: &mut self.device,
            command_list: cmd.as_mut(),
            storage: &mut self.storage,
            frame_fence: None,
            swapchains: self.swapchains.clone(),
            screen_extent: extent(256, 256),
            settings: self.settings.clone(),
        });
        declare(&mut graph);
        graph.compile()
    }

    pub fn assert_no_validation_errors(&self) {
        let errors = self.device.validation_errors();
        assert!(errors.is_empty(), "validation errors: {errors:#?}");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.storage.release(&mut self.device);
    }
}
