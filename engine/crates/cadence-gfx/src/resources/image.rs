use ash::vk;

use crate::resources::sampler::GfxSamplerDesc;

/// 创建一个 2D image（附带默认 view 与可选的 sampler）所需的信息
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageCreateInfo {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    pub sampler: Option<GfxSamplerDesc>,
}

// new & init
impl GfxImageCreateInfo {
    pub fn new_2d(format: vk::Format, extent: vk::Extent2D, usage: vk::ImageUsageFlags) -> Self {
        Self {
            format,
            width: extent.width,
            height: extent.height,
            usage,
            samples: vk::SampleCountFlags::TYPE_1,
            sampler: None,
        }
    }

    #[inline]
    pub fn with_sampler(mut self, sampler: Option<GfxSamplerDesc>) -> Self {
        self.sampler = sampler;
        self
    }
}

// getters
impl GfxImageCreateInfo {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        GfxFormatUtils::aspect(self.format)
    }

    pub fn vk_create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(self.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

/// 与 format 相关的工具函数
pub struct GfxFormatUtils;
impl GfxFormatUtils {
    pub fn is_depth(format: vk::Format) -> bool {
        matches!(
            format,
            vk::Format::D16_UNORM
                | vk::Format::X8_D24_UNORM_PACK32
                | vk::Format::D32_SFLOAT
                | vk::Format::D16_UNORM_S8_UINT
                | vk::Format::D24_UNORM_S8_UINT
                | vk::Format::D32_SFLOAT_S8_UINT
        )
    }

    pub fn has_stencil(format: vk::Format) -> bool {
        matches!(
            format,
            vk::Format::S8_UINT
                | vk::Format::D16_UNORM_S8_UINT
                | vk::Format::D24_UNORM_S8_UINT
                | vk::Format::D32_SFLOAT_S8_UINT
        )
    }

    /// 根据 format 推断 image 的 aspect
    pub fn aspect(format: vk::Format) -> vk::ImageAspectFlags {
        match (Self::is_depth(format), Self::has_stencil(format)) {
            (true, true) => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            (true, false) => vk::ImageAspectFlags::DEPTH,
            (false, true) => vk::ImageAspectFlags::STENCIL,
            (false, false) => vk::ImageAspectFlags::COLOR,
        }
    }
}
