//! barrier 计算与 attachment 折叠

mod common;

use ash::vk;
use cadence_gfx::{GfxClearValue, ImageHandle, headless::HeadlessCommand};
use cadence_render_graph::{ComputePassInfo, GraphicsPassInfo, RenderGraph, RgImageState, WindowId};
use common::{Harness, RGBA8, extent};

const CLEAR: vk::AttachmentLoadOp = vk::AttachmentLoadOp::CLEAR;
const LOAD: vk::AttachmentLoadOp = vk::AttachmentLoadOp::LOAD;

/// A 的第一个 pass 写 mip_0，第二个 pass 采样 mip_0
fn declare_mip_chain(graph: &mut RenderGraph) {
    let mut a = graph.add_component("A");
    let mip_0 = a.add_private_image("mip_0", RGBA8, 64, 64, None);
    let mip_1 = a.add_private_image("mip_1", RGBA8, 32, 32, None);
    a.add_graphics_pass(GraphicsPassInfo::new("GraphicsPass", 64, 64), |_, cmd| cmd.cmd_draw(3, 1, 0, 0))
        .use_color_attachment(mip_0, CLEAR, Some([1.0, 0.0, 0.0, 1.0]));
    a.add_graphics_pass(GraphicsPassInfo::new("GraphicsPass2", 32, 32), |_, cmd| cmd.cmd_draw(3, 1, 0, 0))
        .use_image_sampled(mip_0)
        .use_color_attachment(mip_1, CLEAR, Some([0.0; 4]));
}

#[test]
fn sampled_after_color_write() {
    let mut harness = Harness::new();
    let plan = harness.compile(declare_mip_chain).unwrap();

    assert_eq!(plan.pass_order(), vec!["GraphicsPass", "GraphicsPass2"]);

    let barrier = plan.barrier_for("GraphicsPass2", "A", "mip_0").unwrap();
    assert_eq!(barrier.src_state, RgImageState::COLOR_ATTACHMENT_WRITE);
    assert_eq!(barrier.dst_state, RgImageState::SHADER_READ_FRAGMENT);

    // 采样不是 attachment，必须是显式 barrier
    let pass = plan.pass("GraphicsPass2").unwrap();
    assert_eq!(pass.barriers.len(), 2);
    assert!(pass.folded.is_empty());

    let gfx = barrier.to_gfx_barrier(ImageHandle::default());
    assert_eq!(gfx.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
    assert_eq!(gfx.dst_access, vk::AccessFlags2::SHADER_READ);
    assert_eq!(gfx.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(gfx.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(gfx.aspect, vk::ImageAspectFlags::COLOR);
}

#[test]
fn recorded_barriers_pass_validation() {
    let mut harness = Harness::new();
    harness.run_frame(declare_mip_chain).unwrap();

    harness.assert_no_validation_errors();
    let barriers = harness
        .device
        .executed_commands()
        .into_iter()
        .filter_map(|command| match command {
            HeadlessCommand::Barrier(barriers) => Some(barriers),
            _ => None,
        })
        .collect::<Vec<_>>();
    // GraphicsPass: mip_0 首次使用；GraphicsPass2: mip_0 采样 + mip_1 首次使用
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[0].len(), 1);
    assert_eq!(barriers[1].len(), 2);
    assert!(barriers[1].iter().any(|barrier| barrier.new_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        && barrier.src_access == vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
}

fn declare_accumulate(graph: &mut RenderGraph) {
    let mut scene = graph.add_component("scene");
    let color = scene.add_private_image("color", RGBA8, 16, 16, None);
    scene
        .add_graphics_pass(GraphicsPassInfo::new("opaque", 16, 16), |_, _| {})
        .use_color_attachment(color, CLEAR, Some([0.0, 0.0, 1.0, 1.0]));
    scene
        .add_graphics_pass(GraphicsPassInfo::new("transparent", 16, 16), |_, _| {})
        .use_color_attachment(color, LOAD, None);
}

#[test]
fn adjacent_attachment_transition_is_folded() {
    let mut harness = Harness::new();
    let plan = harness.compile(declare_accumulate).unwrap();

    let opaque = plan.pass("opaque").unwrap();
    assert_eq!(opaque.barriers.len(), 1);
    assert_eq!(opaque.barriers[0].src_state, RgImageState::UNDEFINED);
    assert_eq!(opaque.color_attachments[0].initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(opaque.color_attachments[0].clear_value, Some(GfxClearValue::Color([0.0, 0.0, 1.0, 1.0])));

    let transparent = plan.pass("transparent").unwrap();
    assert!(transparent.barriers.is_empty());
    assert_eq!(transparent.folded.len(), 1);
    let attachment = &transparent.color_attachments[0];
    assert_eq!(attachment.initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(attachment.load_op, LOAD);
    assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
    assert_eq!(transparent.dependency.src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
    assert_eq!(transparent.dependency.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
    assert_eq!(
        transparent.dependency.dst_access,
        vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
    );
    assert_eq!(plan.explicit_barrier_count(), 1);

    harness.run_frame(declare_accumulate).unwrap();
    harness.assert_no_validation_errors();

    // 折叠后的同步随 BeginPass 一起记录
    let recorded = harness
        .device
        .executed_commands()
        .into_iter()
        .find_map(|command| match command {
            HeadlessCommand::BeginPass(info) if info.name == "transparent" => Some(info),
            _ => None,
        })
        .unwrap();
    assert!(!recorded.dependency.is_empty());
    assert!(recorded.dependency.src_access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
    let (barriers, dependency) = recorded.entry_sync();
    assert!(barriers.is_empty());
    assert_eq!(dependency, Some(recorded.dependency));
}

#[test]
fn folding_can_be_disabled() {
    let mut harness = Harness::new();
    harness.settings.fold_attachment_transitions = false;
    let plan = harness.compile(declare_accumulate).unwrap();

    let transparent = plan.pass("transparent").unwrap();
    assert_eq!(transparent.barriers.len(), 1);
    assert!(transparent.folded.is_empty());
    assert!(transparent.dependency.is_empty());
    assert_eq!(transparent.barriers[0].src_state, RgImageState::COLOR_ATTACHMENT_WRITE);
    assert_eq!(transparent.barriers[0].dst_state, RgImageState::COLOR_ATTACHMENT_READ_WRITE);
    assert_eq!(plan.explicit_barrier_count(), 2);
}

#[test]
fn read_to_read_in_same_layout_needs_no_barrier() {
    let mut harness = Harness::new();
    let plan = harness
        .compile(|graph| {
            let mut blur = graph.add_component("blur");
            let source = blur.add_private_image("source", RGBA8, 8, 8, None);
            let a = blur.add_private_image("a", RGBA8, 8, 8, None);
            let b = blur.add_private_image("b", RGBA8, 8, 8, None);
            blur.add_graphics_pass(GraphicsPassInfo::new("fill", 8, 8), |_, _| {})
                .use_color_attachment(source, CLEAR, Some([0.0; 4]));
            blur.add_graphics_pass(GraphicsPassInfo::new("first", 8, 8), |_, _| {})
                .use_image_sampled(source)
                .use_color_attachment(a, CLEAR, Some([0.0; 4]));
            blur.add_graphics_pass(GraphicsPassInfo::new("second", 8, 8), |_, _| {})
                .use_image_sampled(source)
                .use_color_attachment(b, CLEAR, Some([0.0; 4]));
        })
        .unwrap();

    assert!(plan.barrier_for("first", "blur", "source").is_some());
    assert!(plan.barrier_for("second", "blur", "source").is_none());
}

fn declare_probes(graph: &mut RenderGraph) {
    let mut gi = graph.add_component("gi");
    let probes = gi.add_private_image("probes", vk::Format::R16G16B16A16_SFLOAT, 32, 32, None);
    let color = gi.add_private_image("color", RGBA8, 32, 32, None);
    gi.add_compute_pass(
        ComputePassInfo::new("update").with_hints(
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_WRITE,
        ),
        |_, cmd| cmd.cmd_dispatch([4, 4, 1]),
    )
    .use_image_storage_read_write(probes);
    gi.add_graphics_pass(GraphicsPassInfo::new("shade", 32, 32), |_, cmd| cmd.cmd_draw(3, 1, 0, 0))
        .use_image_sampled(probes)
        .use_color_attachment(color, CLEAR, Some([0.0; 4]));
}

#[test]
fn storage_image_between_compute_and_graphics() {
    let mut harness = Harness::new();
    let plan = harness.compile(declare_probes).unwrap();

    let update = plan.barrier_for("update", "gi", "probes").unwrap();
    assert_eq!(update.dst_state.layout, vk::ImageLayout::GENERAL);
    assert!(update.dst_state.access.contains(vk::AccessFlags2::SHADER_STORAGE_WRITE));

    let shade = plan.barrier_for("shade", "gi", "probes").unwrap();
    assert_eq!(shade.src_state.layout, vk::ImageLayout::GENERAL);
    assert_eq!(shade.dst_state.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(
        shade.to_gfx_barrier(ImageHandle::default()).src_access,
        vk::AccessFlags2::SHADER_WRITE | vk::AccessFlags2::SHADER_STORAGE_WRITE
    );

    let probes = plan.image_index("gi", "probes").unwrap();
    assert!(plan.images[probes].create_info.usage.contains(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED));

    harness.run_frame(declare_probes).unwrap();
    harness.assert_no_validation_errors();
}

fn declare_feedback(graph: &mut RenderGraph) {
    let mut feedback = graph.add_component("feedback");
    let color = feedback.add_private_image("color", RGBA8, 8, 8, None);
    feedback
        .add_graphics_pass(GraphicsPassInfo::new("fill", 8, 8), |_, _| {})
        .use_color_attachment(color, CLEAR, Some([0.5; 4]));
    feedback
        .add_graphics_pass(GraphicsPassInfo::new("self_read", 8, 8), |_, _| {})
        .use_image_sampled(color)
        .use_color_attachment(color, LOAD, None);
}

#[test]
fn read_and_write_in_one_pass_use_general() {
    let mut harness = Harness::new();
    let plan = harness.compile(declare_feedback).unwrap();

    let pass = plan.pass("self_read").unwrap();
    assert_eq!(pass.color_attachments[0].pass_layout, vk::ImageLayout::GENERAL);
    assert_eq!(pass.color_attachments[0].initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    harness.run_frame(declare_feedback).unwrap();
    harness.assert_no_validation_errors();
}

#[test]
fn depth_attachment_uses_depth_aspect() {
    let mut harness = Harness::new();
    let plan = harness
        .compile(|graph| {
            let mut shadows = graph.add_component("shadows");
            let depth = shadows.add_private_image("depth", vk::Format::D24_UNORM_S8_UINT, 64, 64, None);
            shadows
                .add_graphics_pass(GraphicsPassInfo::new("cascade", 64, 64), |_, _| {})
                .use_depth_stencil_attachment(depth, CLEAR, Some(vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 }));
        })
        .unwrap();

    let barrier = plan.barrier_for("cascade", "shadows", "depth").unwrap();
    assert_eq!(barrier.aspect, vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
    assert_eq!(barrier.dst_state.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    let attachment = plan.pass("cascade").unwrap().depth_stencil_attachment.unwrap();
    assert_eq!(attachment.clear_value, Some(GfxClearValue::DepthStencil { depth: 1.0, stencil: 0 }));
}

#[test]
fn present_transitions_source_to_transfer_src() {
    let mut harness = Harness::new();
    harness.add_window(0, extent(32, 32));
    let plan = harness
        .compile(|graph| {
            let mut scene = graph.add_component("scene");
            let color = scene.add_output_image("color", RGBA8, 64, 48, None);
            scene
                .add_graphics_pass(GraphicsPassInfo::new("forward", 64, 48), |_, _| {})
                .use_color_attachment(color, CLEAR, Some([0.0; 4]));
            graph.connect_swapchain_image("scene", "color", WindowId(0));
        })
        .unwrap();

    let present = &plan.presents[0];
    let barrier = present.src_barrier.unwrap();
    assert_eq!(barrier.src_state, RgImageState::COLOR_ATTACHMENT_WRITE);
    assert_eq!(barrier.dst_state, RgImageState::TRANSFER_SRC);
    assert_eq!(present.blit_extent, extent(32, 32));

    let color = plan.image_index("scene", "color").unwrap();
    assert!(plan.images[color].create_info.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
    assert_eq!(plan.images[color].final_state, RgImageState::TRANSFER_SRC);
}
