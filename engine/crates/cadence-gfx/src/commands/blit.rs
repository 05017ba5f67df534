use ash::vk;

use crate::handles::ImageHandle;

/// 单个 region 的 image blit
///
/// 区域用 `[min, max)` 两个角点表示，与 `vk::ImageBlit::src_offsets` 一致。
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxImageBlit {
    pub src_image: ImageHandle,
    pub src_layout: vk::ImageLayout,
    pub src_region: [vk::Offset3D; 2],
    pub dst_image: ImageHandle,
    pub dst_layout: vk::ImageLayout,
    pub dst_region: [vk::Offset3D; 2],
    pub filter: vk::Filter,
}

impl GfxImageBlit {
    /// 两个 image 左上角对齐，拷贝 `extent` 大小的区域
    pub fn aligned(src_image: ImageHandle, dst_image: ImageHandle, extent: vk::Extent2D, filter: vk::Filter) -> Self {
        let region = [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: extent.width as i32,
                y: extent.height as i32,
                z: 1,
            },
        ];
        Self {
            src_image,
            src_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            src_region: region,
            dst_image,
            dst_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            dst_region: region,
            filter,
        }
    }

    #[inline]
    pub fn to_vk(&self) -> vk::ImageBlit {
        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        vk::ImageBlit {
            src_subresource: layers,
            src_offsets: self.src_region,
            dst_subresource: layers,
            dst_offsets: self.dst_region,
        }
    }
}
