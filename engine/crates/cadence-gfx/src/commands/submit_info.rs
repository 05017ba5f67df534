use ash::vk;
use itertools::Itertools;

/// 提交时需要等待或 signal 的 semaphore
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxSemaphoreInfo {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
    /// timeline semaphore 的值，binary semaphore 为 None
    pub value: Option<u64>,
}

impl GfxSemaphoreInfo {
    #[inline]
    pub fn binary(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        Self {
            semaphore,
            stage,
            value: None,
        }
    }

    #[inline]
    pub fn timeline(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2, value: u64) -> Self {
        Self {
            semaphore,
            stage,
            value: Some(value),
        }
    }

    #[inline]
    pub fn to_vk(&self) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(self.semaphore)
            .stage_mask(self.stage)
            .value(self.value.unwrap_or_default())
    }
}

/// 一次队列提交
#[derive(Clone, Debug, Default)]
pub struct GfxSubmitInfo {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub waits: Vec<GfxSemaphoreInfo>,
    pub signals: Vec<GfxSemaphoreInfo>,
    /// 提交完成后 signal 的 fence
    pub fence: Option<vk::Fence>,
}

impl GfxSubmitInfo {
    pub fn new(command_buffers: &[vk::CommandBuffer]) -> Self {
        Self {
            command_buffers: command_buffers.to_vec(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn wait(mut self, semaphore: GfxSemaphoreInfo) -> Self {
        self.waits.push(semaphore);
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: GfxSemaphoreInfo) -> Self {
        self.signals.push(semaphore);
        self
    }

    #[inline]
    pub fn fence(mut self, fence: vk::Fence) -> Self {
        self.fence = Some(fence);
        self
    }

    #[inline]
    pub fn command_buffer_infos(&self) -> Vec<vk::CommandBufferSubmitInfo<'static>> {
        self.command_buffers
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
            .collect_vec()
    }

    #[inline]
    pub fn wait_infos(&self) -> Vec<vk::SemaphoreSubmitInfo<'static>> {
        self.waits.iter().map(GfxSemaphoreInfo::to_vk).collect_vec()
    }

    #[inline]
    pub fn signal_infos(&self) -> Vec<vk::SemaphoreSubmitInfo<'static>> {
        self.signals.iter().map(GfxSemaphoreInfo::to_vk).collect_vec()
    }
}
