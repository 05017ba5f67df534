use cadence_gfx::GfxError;
use thiserror::Error;

/// 帧图构建错误
///
/// 都在 `compile` / `submit` 阶段、录制任何 GPU 命令之前返回。
/// 声明阶段的调用错误（重名、非法的 load op 等）直接 panic，不经过这里。
#[derive(Error, Debug)]
pub enum RenderGraphError {
    #[error("Unresolved image reference: component \"{component}\", image \"{image}\"")]
    UnresolvedReference { component: String, image: String },

    #[error("Invalid connection {src} -> {dst}: {reason}")]
    InvalidConnection { src: String, dst: String, reason: String },

    #[error("Cyclic dependency between passes: {}", passes.join(", "))]
    CyclicDependency { passes: Vec<String> },

    #[error("No swapchain registered for window {0}")]
    UnknownWindow(u32),

    #[error("Backend error: {0}")]
    Backend(#[from] GfxError),
}

pub type RenderGraphResult<T> = Result<T, RenderGraphError>;
