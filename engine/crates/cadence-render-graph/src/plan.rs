//! 编译后的帧计划
//!
//! [`FramePlan`] 是 `compile` 的产物：物理 image 表、执行顺序、依赖边、
//! 每个 Pass 的 barrier 与 attachment 描述，以及最后的 swapchain blit。
//! 它不持有任何 GPU 资源，可以在录制之前检查或打印。

use std::{collections::HashMap, path::Path};

use ash::vk;
use cadence_gfx::{GfxClearValue, GfxImageCreateInfo, GfxPassDependency, ImageHandle};

use crate::{
    barrier::PlannedBarrier, dependency::DependencyEdge, image::ImageId, pass::ImageUsage,
    resource_state::RgImageState, storage::StorageKey,
};

/// 一个需要物理资源的 image（Private / Output）
#[derive(Clone, Debug)]
pub struct PhysicalImage {
    pub key: StorageKey,
    /// 本帧要求的创建信息（已与 storage 中的缓存合并）
    pub create_info: GfxImageCreateInfo,
    /// 声明时的尺寸，blit 按它裁剪
    pub declared_extent: vk::Extent2D,
    pub aspect: vk::ImageAspectFlags,
    /// 本帧开始时的状态
    pub initial_state: RgImageState,
    /// 本帧结束时的状态
    pub final_state: RgImageState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    Graphics,
    Compute,
}

/// Pass 对物理 image 的一次使用
#[derive(Clone, Copy, Debug)]
pub struct PlannedUsage {
    pub image: usize,
    pub usage: ImageUsage,
    pub state: RgImageState,
}

/// attachment 描述；`image` 是物理 image 索引，录制时再换成 [`ImageHandle`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlannedAttachment {
    pub image: usize,
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: Option<GfxClearValue>,
    /// 进入 pass 之前的 layout；折叠时等于上一个 pass 留下的 layout
    pub initial_layout: vk::ImageLayout,
    pub pass_layout: vk::ImageLayout,
}

#[derive(Clone, Debug)]
pub struct PlannedPass {
    /// 全局声明索引
    pub index: usize,
    pub name: String,
    pub component: String,
    pub kind: PassKind,
    /// graphics pass 的 render area
    pub extent: Option<vk::Extent2D>,
    pub samples: vk::SampleCountFlags,
    pub usages: Vec<PlannedUsage>,
    /// 在 pass 开始前录制的显式 barrier
    pub barriers: Vec<PlannedBarrier>,
    /// 折叠进 attachment initial layout 与 pass dependency 的转换
    pub folded: Vec<PlannedBarrier>,
    pub color_attachments: Vec<PlannedAttachment>,
    pub depth_stencil_attachment: Option<PlannedAttachment>,
    pub dependency: GfxPassDependency,
}

/// 所有 Pass 之后 blit 到某个窗口的 swapchain
#[derive(Clone, Debug)]
pub struct PlannedPresent {
    pub window: u32,
    pub image: usize,
    pub swapchain_image: ImageHandle,
    pub src_barrier: Option<PlannedBarrier>,
    pub blit_extent: vk::Extent2D,
}

pub struct FramePlan {
    pub images: Vec<PhysicalImage>,
    /// 按执行顺序排列
    pub passes: Vec<PlannedPass>,
    pub edges: Vec<DependencyEdge>,
    pub presents: Vec<PlannedPresent>,

    /// Input / IO -> 直接上游，供回调中的 `get_image` 重新解析
    pub(crate) links: HashMap<ImageId, ImageId>,
}

// getters
impl FramePlan {
    /// 执行顺序中的 pass 名字
    pub fn pass_order(&self) -> Vec<&str> {
        self.passes.iter().map(|pass| pass.name.as_str()).collect()
    }

    /// 执行顺序中的 `(component, pass)`
    pub fn qualified_pass_order(&self) -> Vec<(&str, &str)> {
        self.passes.iter().map(|pass| (pass.component.as_str(), pass.name.as_str())).collect()
    }

    /// 按名字查找 pass；不同 component 中有同名 pass 时返回执行顺序中的第一个
    pub fn pass(&self, name: &str) -> Option<&PlannedPass> {
        self.passes.iter().find(|pass| pass.name == name)
    }

    pub fn pass_in(&self, component: &str, name: &str) -> Option<&PlannedPass> {
        self.passes.iter().find(|pass| pass.component == component && pass.name == name)
    }

    /// pass 在执行顺序中的位置
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.passes.iter().position(|pass| pass.name == name)
    }

    pub fn image_index(&self, component: &str, image: &str) -> Option<usize> {
        self.images.iter().position(|physical| physical.key.component == component && physical.key.image == image)
    }

    /// 依赖边，以 pass 名字表示
    pub fn edge_names(&self) -> Vec<(&str, &str)> {
        self.edges
            .iter()
            .filter_map(|edge| {
                let producer = self.passes.iter().find(|pass| pass.index == edge.producer)?;
                let consumer = self.passes.iter().find(|pass| pass.index == edge.consumer)?;
                Some((producer.name.as_str(), consumer.name.as_str()))
            })
            .collect()
    }

    /// 某个 pass 在开始前对物理 image 的转换，显式与折叠的都算
    pub fn barrier_for(&self, pass: &str, component: &str, image: &str) -> Option<&PlannedBarrier> {
        let image = self.image_index(component, image)?;
        let pass = self.pass(pass)?;
        pass.barriers.iter().chain(pass.folded.iter()).find(|barrier| barrier.image == image)
    }

    pub fn explicit_barrier_count(&self) -> usize {
        self.passes.iter().map(|pass| pass.barriers.len()).sum::<usize>()
            + self.presents.iter().filter(|present| present.src_barrier.is_some()).count()
    }
}

// 调试方法
impl FramePlan {
    /// 打印执行计划（用于调试）
    ///
    /// 输出每个 Pass 的执行顺序、image 用法以及 barrier 详细信息
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Images: {}  |  Execution Order: [{}]",
            self.passes.len(),
            self.images.len(),
            self.pass_order().join(" → ")
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (order, pass) in self.passes.iter().enumerate() {
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!(
                "│ [{}/{}] Pass: \"{}\" ({:?}, component \"{}\")",
                order + 1,
                self.passes.len(),
                pass.name,
                pass.kind,
                pass.component
            );
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            for usage in &pass.usages {
                let icon = if usage.usage.is_write() { "✏️ " } else { "📖" };
                log::info!(
                    "│   {} \"{}\" as {} @ {:?} (stage: {}, access: {})",
                    icon,
                    self.images[usage.image].key,
                    usage.usage.kind_name(),
                    usage.state.layout,
                    format_pipeline_stage(usage.state.stage),
                    format_access_flags(usage.state.access)
                );
            }

            if pass.barriers.is_empty() && pass.folded.is_empty() {
                log::info!("│ No barriers required");
            } else {
                log::info!("├─────────────────────────────────────────────────────────────────┤");
                log::info!("│ Barriers: {} explicit, {} folded", pass.barriers.len(), pass.folded.len());
                for barrier in &pass.barriers {
                    self.print_barrier("🔒", barrier);
                }
                for barrier in &pass.folded {
                    self.print_barrier("📎", barrier);
                }
            }

            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        for present in &self.presents {
            log::info!("");
            log::info!(
                "▶ Present \"{}\" to window {} ({}x{})",
                self.images[present.image].key,
                present.window,
                present.blit_extent.width,
                present.blit_extent.height
            );
            if let Some(barrier) = &present.src_barrier {
                self.print_barrier("🔒", barrier);
            }
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }

    fn print_barrier(&self, icon: &str, barrier: &PlannedBarrier) {
        let layout_change = if barrier.src_state.layout != barrier.dst_state.layout {
            format!("{:?} → {:?}", barrier.src_state.layout, barrier.dst_state.layout)
        } else {
            format!("{:?} (no layout change)", barrier.src_state.layout)
        };
        log::info!("│   {} Image \"{}\":", icon, self.images[barrier.image].key);
        log::info!("│       Layout: {}", layout_change);
        log::info!(
            "│       Stage:  {} → {}",
            format_pipeline_stage(barrier.src_state.stage),
            format_pipeline_stage(barrier.dst_state.stage)
        );
        log::info!(
            "│       Access: {} → {}",
            format_access_flags(barrier.src_state.src_access()),
            format_access_flags(barrier.dst_state.access)
        );
        log::info!("│       Aspect: {:?}", barrier.aspect);
    }

    /// Graphviz dot 格式：节点按执行顺序排列，边为依赖关系
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph render_graph {\n    rankdir=LR;\n    node [shape=box];\n");
        for (order, pass) in self.passes.iter().enumerate() {
            dot.push_str(&format!(
                "    p{} [label=\"{}: {}\\n{}\"];\n",
                pass.index, order, pass.name, pass.component
            ));
        }
        for edge in &self.edges {
            dot.push_str(&format!("    p{} -> p{};\n", edge.producer, edge.consumer));
        }
        dot.push_str("}\n");
        dot
    }

    pub fn save_dot(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_dot())
    }
}

/// 格式化 PipelineStageFlags2 为可读字符串
fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    const STAGES: &[(vk::PipelineStageFlags2, &str)] = &[
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAG_TESTS"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAG_TESTS"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_OUTPUT"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
        (vk::PipelineStageFlags2::ALL_GRAPHICS, "ALL_GRAPHICS"),
        (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
    ];

    if stage.is_empty() {
        return "NONE".to_string();
    }
    let names: Vec<&str> = STAGES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect();
    if names.is_empty() { format!("{:?}", stage) } else { names.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
fn format_access_flags(access: vk::AccessFlags2) -> String {
    const ACCESSES: &[(vk::AccessFlags2, &str)] = &[
        (vk::AccessFlags2::SHADER_READ, "SHADER_READ"),
        (vk::AccessFlags2::SHADER_WRITE, "SHADER_WRITE"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_READ"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_WRITE"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_READ"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_WRITE"),
        (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
        (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
        (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
        (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
    ];

    if access.is_empty() {
        return "NONE".to_string();
    }
    let names: Vec<&str> =
        ACCESSES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect();
    if names.is_empty() { format!("{:?}", access) } else { names.join(" | ") }
}
