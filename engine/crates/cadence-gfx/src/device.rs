use ash::vk;

use crate::{
    commands::{
        barrier::GfxImageBarrier, blit::GfxImageBlit, pass::GfxPassBeginInfo, submit_info::GfxSubmitInfo,
    },
    error::GfxResult,
    handles::ImageHandle,
    resources::image::GfxImageCreateInfo,
};

/// 设备接口：资源生命周期与队列提交
///
/// 帧图核心只依赖这个 trait，不关心后端是真实 GPU 还是 headless。
pub trait GfxDevice {
    /// 创建 image（连同默认 view，以及 `info.sampler` 指定的 sampler）
    fn create_image(&mut self, info: &GfxImageCreateInfo, debug_name: &str) -> GfxResult<ImageHandle>;

    /// 销毁 image；调用者需要保证 GPU 不再使用它
    fn destroy_image(&mut self, image: ImageHandle);

    fn image_extent(&self, image: ImageHandle) -> Option<vk::Extent2D>;

    fn image_format(&self, image: ImageHandle) -> Option<vk::Format>;

    /// 阻塞直到 GPU 空闲
    fn wait_idle(&mut self) -> GfxResult<()>;

    /// 分配一个命令列表，生命周期为当前帧
    fn create_command_list(&mut self, debug_name: &str) -> GfxResult<Box<dyn GfxCommandList>>;

    fn submit(&mut self, submit_info: &GfxSubmitInfo) -> GfxResult<()>;

    /// 当前是第几个 frame in flight
    fn frame_index(&self) -> usize;

    fn frames_in_flight(&self) -> usize;
}

/// 命令录制接口
///
/// 只负责录制，帧图核心不会回读命令内容。
pub trait GfxCommandList {
    /// 提交时使用的句柄
    fn vk_handle(&self) -> vk::CommandBuffer;

    fn begin(&mut self) -> GfxResult<()>;

    fn end(&mut self) -> GfxResult<()>;

    fn begin_label(&mut self, label_name: &str, label_color: [f32; 4]);

    fn end_label(&mut self);

    fn cmd_begin_pass(&mut self, info: &GfxPassBeginInfo);

    fn cmd_end_pass(&mut self);

    fn cmd_image_memory_barrier(&mut self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]);

    fn cmd_blit_image(&mut self, blit: &GfxImageBlit);

    fn cmd_draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    fn cmd_dispatch(&mut self, group_count: [u32; 3]);
}

/// debug label 使用的颜色，RGBA
pub struct LabelColor;
impl LabelColor {
    pub const COLOR_PASS: [f32; 4] = [0.2, 0.6, 0.9, 1.0];
    pub const COMPUTE_PASS: [f32; 4] = [0.9, 0.6, 0.2, 1.0];
    pub const TRANSFER: [f32; 4] = [0.5, 0.5, 0.5, 1.0];
}
