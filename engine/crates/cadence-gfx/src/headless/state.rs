use std::collections::HashMap;

use ash::vk;
use slotmap::SlotMap;

use crate::{
    commands::{
        barrier::GfxImageBarrier,
        blit::GfxImageBlit,
        pass::{GfxAttachmentInfo, GfxClearValue, GfxPassBeginInfo},
    },
    handles::ImageHandle,
    resources::{image::GfxFormatUtils, image::GfxImageCreateInfo},
};

/// 尚未被 barrier 或 pass dependency 等待的一次写入
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PendingWrite {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl PendingWrite {
    const COLOR_ATTACHMENT: Self = Self {
        stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
    };
    const DEPTH_STENCIL_ATTACHMENT: Self = Self {
        stage: vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw() | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
    };
    const TRANSFER: Self = Self {
        stage: vk::PipelineStageFlags2::TRANSFER,
        access: vk::AccessFlags2::TRANSFER_WRITE,
    };

    /// src stage / access 是否覆盖了这次写入
    #[inline]
    fn is_covered_by(&self, src_stage: vk::PipelineStageFlags2, src_access: vk::AccessFlags2) -> bool {
        (src_stage.contains(self.stage) || src_stage.contains(vk::PipelineStageFlags2::ALL_COMMANDS))
            && (src_access.contains(self.access) || src_access.contains(vk::AccessFlags2::MEMORY_WRITE))
    }
}

/// headless 后端录制下来的一条命令
#[derive(Clone, Debug, PartialEq)]
pub enum HeadlessCommand {
    BeginLabel(String),
    EndLabel,
    BeginPass(GfxPassBeginInfo),
    EndPass,
    Barrier(Vec<GfxImageBarrier>),
    Blit(GfxImageBlit),
    Draw { vertex_count: u32, instance_count: u32 },
    Dispatch([u32; 3]),
}

pub(crate) struct HeadlessImage {
    pub name: String,
    pub info: GfxImageCreateInfo,
    pub layout: vk::ImageLayout,
    /// RGBA，depth image 只使用第一个分量
    pub pixels: Vec<[f32; 4]>,
    /// depth image 的 stencil 值，与 `pixels` 一一对应
    pub stencil: Vec<u32>,
    pub pending_write: Option<PendingWrite>,
    /// 由外部导入（例如 swapchain image），不计入 live image
    pub external: bool,
}

impl HeadlessImage {
    pub fn new(name: &str, info: GfxImageCreateInfo, external: bool) -> Self {
        Self {
            name: name.to_string(),
            info,
            layout: vk::ImageLayout::UNDEFINED,
            pixels: vec![[0.0; 4]; (info.width * info.height) as usize],
            stencil: vec![0; (info.width * info.height) as usize],
            pending_write: None,
            external,
        }
    }
}

#[derive(Default)]
pub(crate) struct HeadlessState {
    pub images: SlotMap<ImageHandle, HeadlessImage>,
    /// 已经 end，等待提交的命令列表
    pub pending_lists: HashMap<vk::CommandBuffer, Vec<HeadlessCommand>>,
    pub next_command_buffer: u64,

    pub executed: Vec<HeadlessCommand>,
    pub validation_errors: Vec<String>,
    pub signaled_fences: Vec<vk::Fence>,
    pub submit_count: usize,
    pub wait_idle_count: usize,
    /// live image 数量上限，超过时 create_image 失败
    pub image_budget: Option<usize>,

    in_pass: Option<String>,
    label_depth: usize,
}

// getters
impl HeadlessState {
    pub fn live_image_count(&self) -> usize {
        self.images.values().filter(|image| !image.external).count()
    }
}

// tools
impl HeadlessState {
    pub fn execute(&mut self, command: &HeadlessCommand) {
        match command {
            HeadlessCommand::BeginLabel(_) => self.label_depth += 1,
            HeadlessCommand::EndLabel => {
                if self.label_depth == 0 {
                    self.report("end_label without matching begin_label".to_string());
                } else {
                    self.label_depth -= 1;
                }
            }
            HeadlessCommand::Barrier(barriers) => {
                for barrier in barriers {
                    self.wait_pending_write(barrier.image, barrier.src_stage, barrier.src_access, "barrier");
                    self.transition(barrier.image, barrier.old_layout, barrier.new_layout, "barrier");
                }
            }
            HeadlessCommand::BeginPass(info) => self.begin_pass(info),
            HeadlessCommand::EndPass => {
                if self.in_pass.take().is_none() {
                    self.report("end_pass outside of a render pass".to_string());
                }
            }
            HeadlessCommand::Blit(blit) => self.blit(blit),
            HeadlessCommand::Draw { .. } => {
                if self.in_pass.is_none() {
                    self.report("draw outside of a render pass".to_string());
                }
            }
            HeadlessCommand::Dispatch(_) => {
                if let Some(pass) = &self.in_pass {
                    self.report(format!("dispatch inside render pass \"{pass}\""));
                }
            }
        }
        self.executed.push(command.clone());
    }

    fn report(&mut self, message: String) {
        log::error!("[headless] {message}");
        self.validation_errors.push(message);
    }

    /// 用 src stage / access 等待 image 上尚未同步的写入，覆盖不到时记录 validation error
    fn wait_pending_write(
        &mut self,
        image: ImageHandle,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        context: &str,
    ) {
        let Some(state) = self.images.get_mut(image) else {
            return;
        };
        let Some(write) = state.pending_write.take() else {
            return;
        };
        if !write.is_covered_by(src_stage, src_access) {
            let message = format!(
                "[{context}] image \"{}\" was written at {:?} / {:?} but is synchronized with {:?} / {:?}",
                state.name, write.stage, write.access, src_stage, src_access
            );
            self.report(message);
        }
    }

    /// 把 image 从 `old_layout` 转换到 `new_layout`；`UNDEFINED` 表示丢弃旧内容，可以从任意 layout 转换
    fn transition(
        &mut self,
        image: ImageHandle,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        context: &str,
    ) {
        let Some(state) = self.images.get_mut(image) else {
            self.report(format!("[{context}] use of destroyed or unknown image {image:?}"));
            return;
        };
        if old_layout != vk::ImageLayout::UNDEFINED && old_layout != state.layout {
            let message = format!(
                "[{context}] image \"{}\" transitioned from {:?} but its current layout is {:?}",
                state.name, old_layout, state.layout
            );
            state.layout = new_layout;
            self.report(message);
            return;
        }
        state.layout = new_layout;
    }

    fn begin_pass(&mut self, info: &GfxPassBeginInfo) {
        if let Some(pass) = &self.in_pass {
            let message = format!("begin_pass \"{}\" while \"{pass}\" is still active", info.name);
            self.report(message);
        }
        self.in_pass = Some(info.name.clone());

        for attachment in &info.color_attachments {
            self.begin_attachment(info, attachment, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
            self.set_pending_write(attachment.image, PendingWrite::COLOR_ATTACHMENT);
        }
        if let Some(attachment) = &info.depth_stencil_attachment {
            self.begin_attachment(info, attachment, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
            self.set_pending_write(attachment.image, PendingWrite::DEPTH_STENCIL_ATTACHMENT);
        }
    }

    fn begin_attachment(&mut self, info: &GfxPassBeginInfo, attachment: &GfxAttachmentInfo, expected: vk::ImageLayout) {
        // 同一 pass 内既作为 attachment 又被读取的 image 使用 GENERAL
        if attachment.pass_layout != expected && attachment.pass_layout != vk::ImageLayout::GENERAL {
            self.report(format!(
                "[{}] attachment used with layout {:?}, expected {:?}",
                info.name, attachment.pass_layout, expected
            ));
        }
        // 上一次写入要么已经被显式 barrier 等待，要么由 pass dependency 等待
        self.wait_pending_write(attachment.image, info.dependency.src_stage, info.dependency.src_access, &info.name);
        self.transition(attachment.image, attachment.initial_layout, attachment.pass_layout, &info.name);

        let Some(image) = self.images.get_mut(attachment.image) else {
            return;
        };
        if image.info.width < info.extent.width || image.info.height < info.extent.height {
            let message = format!(
                "[{}] attachment \"{}\" ({}x{}) is smaller than the render area ({}x{})",
                info.name, image.name, image.info.width, image.info.height, info.extent.width, info.extent.height
            );
            self.report(message);
            return;
        }

        if attachment.load_op == vk::AttachmentLoadOp::CLEAR {
            let (value, stencil) = match attachment.clear_value {
                Some(GfxClearValue::Color(color)) => (color, 0),
                Some(GfxClearValue::DepthStencil { depth, stencil }) => ([depth, 0.0, 0.0, 0.0], stencil),
                None => {
                    let message = format!("[{}] attachment \"{}\" is cleared without a clear value", info.name, image.name);
                    self.report(message);
                    return;
                }
            };
            let width = image.info.width as usize;
            for y in 0..info.extent.height as usize {
                for x in 0..info.extent.width as usize {
                    image.pixels[y * width + x] = value;
                    image.stencil[y * width + x] = stencil;
                }
            }
        }

        if GfxFormatUtils::is_depth(image.info.format) != GfxFormatUtils::is_depth(attachment.format) {
            let message = format!("[{}] attachment format does not match image \"{}\"", info.name, image.name);
            self.report(message);
        }
    }

    fn blit(&mut self, blit: &GfxImageBlit) {
        let (Some(src), Some(dst)) = (self.images.get(blit.src_image), self.images.get(blit.dst_image)) else {
            self.report("[blit] use of destroyed or unknown image".to_string());
            return;
        };
        let mut errors = vec![];
        if src.layout != blit.src_layout {
            errors.push(format!("[blit] source \"{}\" is in {:?}, expected {:?}", src.name, src.layout, blit.src_layout));
        }
        if dst.layout != blit.dst_layout {
            errors.push(format!("[blit] destination \"{}\" is in {:?}, expected {:?}", dst.name, dst.layout, blit.dst_layout));
        }
        for (role, image) in [("source", src), ("destination", dst)] {
            if let Some(write) = image.pending_write {
                errors.push(format!("[blit] {role} \"{}\" has an unsynchronized write at {:?}", image.name, write.stage));
            }
        }
        if !errors.is_empty() {
            errors.into_iter().for_each(|error| self.report(error));
            return;
        }

        let src_pixels = src.pixels.clone();
        let src_width = src.info.width as i32;
        let src_height = src.info.height as i32;
        let [src_min, src_max] = blit.src_region;
        let [dst_min, dst_max] = blit.dst_region;
        let src_w = (src_max.x - src_min.x) as f32;
        let src_h = (src_max.y - src_min.y) as f32;
        let dst_w = (dst_max.x - dst_min.x).max(1) as f32;
        let dst_h = (dst_max.y - dst_min.y).max(1) as f32;

        let Some(dst) = self.images.get_mut(blit.dst_image) else {
            return;
        };
        let dst_width = dst.info.width as i32;
        let dst_height = dst.info.height as i32;
        // 最近邻：取目标像素中心映射回源区域
        for y in dst_min.y.max(0)..dst_max.y.min(dst_height) {
            for x in dst_min.x.max(0)..dst_max.x.min(dst_width) {
                let u = src_min.x + (((x - dst_min.x) as f32 + 0.5) / dst_w * src_w) as i32;
                let v = src_min.y + (((y - dst_min.y) as f32 + 0.5) / dst_h * src_h) as i32;
                let u = u.clamp(0, src_width - 1);
                let v = v.clamp(0, src_height - 1);
                dst.pixels[(y * dst_width + x) as usize] = src_pixels[(v * src_width + u) as usize];
            }
        }
        dst.pending_write = Some(PendingWrite::TRANSFER);
    }

    fn set_pending_write(&mut self, image: ImageHandle, write: PendingWrite) {
        if let Some(image) = self.images.get_mut(image) {
            image.pending_write = Some(write);
        }
    }
}
