//! 帧图调试工具
//!
//! 在 headless 后端上构建一个示例帧（forward -> bloom -> tonemap -> swapchain），
//! 打印执行计划并把排序后的帧图写成 dot 文件。
//!
//! 用法：`render-graph-dump [settings.toml]`

use ash::vk;
use cadence_crate_tools::init_log::init_log;
use cadence_gfx::{GfxDevice, GfxSamplerDesc, headless::HeadlessDevice};
use cadence_render_graph::{
    ComputePassInfo, GraphInfo, GraphStorage, GraphSwapchainInfo, GraphicsPassInfo, RenderGraph, RenderGraphError,
    RenderGraphSettings, WindowId,
};

const SCREEN: vk::Extent2D = vk::Extent2D {
    width: 1280,
    height: 720,
};
const HDR: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
const LDR: vk::Format = vk::Format::R8G8B8A8_UNORM;

fn load_settings() -> RenderGraphSettings {
    let Some(path) = std::env::args().nth(1) else {
        return RenderGraphSettings {
            log_execution_plan: true,
            ..Default::default()
        };
    };
    match std::fs::read_to_string(&path).map(|content| RenderGraphSettings::from_toml_str(&content)) {
        Ok(Ok(settings)) => settings,
        Ok(Err(err)) => {
            log::error!("invalid settings file {}: {}", path, err);
            std::process::exit(1);
        }
        Err(err) => {
            log::error!("failed to read settings file {}: {}", path, err);
            std::process::exit(1);
        }
    }
}

fn declare_frame(graph: &mut RenderGraph) {
    let extent = graph.get_screen_extent();
    let (width, height) = (extent.width, extent.height);

    // 下游 component 先声明，连接在最后统一记录
    {
        let mut tonemap = graph.add_component("tonemap");
        let hdr = tonemap.add_input_image("hdr", HDR, width, height);
        let bloom = tonemap.add_input_image("bloom", HDR, width / 2, height / 2);
        let ldr = tonemap.add_output_image("ldr", LDR, width, height, None);
        tonemap
            .add_graphics_pass(GraphicsPassInfo::new("aces", width, height), |_, cmd| cmd.cmd_draw(3, 1, 0, 0))
            .use_image_sampled(hdr)
            .use_image_sampled(bloom)
            .use_color_attachment(ldr, vk::AttachmentLoadOp::DONT_CARE, None);
    }
    {
        let mut forward = graph.add_component("forward");
        let color = forward.add_output_image("color", HDR, width, height, Some(GfxSamplerDesc::nearest_clamp()));
        let depth = forward.add_private_image("depth", vk::Format::D32_SFLOAT, width, height, None);
        forward
            .add_graphics_pass(GraphicsPassInfo::new("opaque", width, height), |_, cmd| cmd.cmd_draw(36, 64, 0, 0))
            .use_color_attachment(color, vk::AttachmentLoadOp::CLEAR, Some([0.0, 0.0, 0.0, 1.0]))
            .use_depth_stencil_attachment(
                depth,
                vk::AttachmentLoadOp::CLEAR,
                Some(vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 }),
            );
        forward
            .add_graphics_pass(GraphicsPassInfo::new("transparent", width, height), |_, cmd| cmd.cmd_draw(6, 8, 0, 0))
            .use_color_attachment(color, vk::AttachmentLoadOp::LOAD, None)
            .use_depth_stencil_attachment(depth, vk::AttachmentLoadOp::LOAD, None);
    }
    {
        let mut bloom = graph.add_component("bloom");
        let source = bloom.add_input_image("source", HDR, width, height);
        let half = bloom.add_output_image("half", HDR, width / 2, height / 2, None);
        bloom
            .add_compute_pass(ComputePassInfo::new("downsample"), move |_, cmd| {
                cmd.cmd_dispatch([width.div_ceil(16), height.div_ceil(16), 1])
            })
            .use_image_storage_read_only(source)
            .use_image_storage_read_write(half);
    }

    graph.connect_image("forward", "color", "bloom", "source");
    graph.connect_image("forward", "color", "tonemap", "hdr");
    graph.connect_image("bloom", "half", "tonemap", "bloom");
    graph.connect_swapchain_image("tonemap", "ldr", WindowId(0));
}

fn main() {
    init_log();

    let settings = load_settings();
    let mut device = HeadlessDevice::default();
    let mut storage = GraphStorage::new();
    let swapchain = device.create_swapchain_image("swapchain", SCREEN, vk::Format::B8G8R8A8_UNORM);

    let result = device.create_command_list("render-graph-dump").map_err(RenderGraphError::from).and_then(|mut cmd| {
        let mut graph = RenderGraph::new(GraphInfo {
            device: &mut device,
            command_list: cmd.as_mut(),
            storage: &mut storage,
            frame_fence: None,
            swapchains: vec![GraphSwapchainInfo {
                window: WindowId(0),
                image: swapchain,
                extent: SCREEN,
                image_acquired: vk::Semaphore::null(),
                present_ready: vk::Semaphore::null(),
            }],
            screen_extent: SCREEN,
            settings,
        });
        declare_frame(&mut graph);
        graph.submit(true)
    });

    match result {
        Ok(()) => {
            let errors = device.validation_errors();
            if errors.is_empty() {
                log::info!("frame recorded without validation errors");
            }
            for error in errors {
                log::error!("{}", error);
            }
        }
        Err(err) => log::error!("frame failed: {}", err),
    }

    if let Err(err) = storage.release(&mut device) {
        log::error!("failed to release graph storage: {}", err);
    }
}
