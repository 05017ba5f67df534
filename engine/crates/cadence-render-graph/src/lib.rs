//! Cadence 帧图（render graph / frame graph）
//!
//! 每一帧由各个渲染功能声明自己的 component、image 与 pass，
//! [`RenderGraph`] 负责：
//!
//! 1. 解析 component 之间的 image 引用（Input / IO -> Output）
//! 2. 根据共享 image 的读写关系建立 pass 之间的依赖边
//! 3. 稳定拓扑排序得到执行顺序
//! 4. 为每次 image 使用的切换生成 layout / stage / access 转换
//! 5. 在外部提供的命令列表上按顺序回放，并把结果 blit 到 swapchain
//!
//! 图本身每帧重建；物理 image 缓存在调用者持有的 [`GraphStorage`] 中跨帧复用。

pub mod barrier;
pub mod component;
pub mod dependency;
pub mod error;
mod executor;
pub mod graph;
pub mod image;
pub mod pass;
pub mod plan;
pub mod resource_state;
pub mod settings;
pub mod storage;

pub use component::RgComponent;
pub use error::{RenderGraphError, RenderGraphResult};
pub use graph::{GraphInfo, GraphSwapchainInfo, RenderGraph, WindowId};
pub use image::{GraphImage, ImageKind};
pub use pass::{
    ComputePassInfo, ComputePassScope, GraphicsPassInfo, GraphicsPassScope, ImageUsage, RgComputePass, RgGraphicsPass,
};
pub use plan::FramePlan;
pub use resource_state::RgImageState;
pub use settings::RenderGraphSettings;
pub use storage::{GraphStorage, StorageKey};
