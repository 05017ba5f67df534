//! 跨帧持久的物理 image 存储
//!
//! 帧图每帧重建，但 Private / Output image 背后的物理资源需要跨帧复用。
//! [`GraphStorage`] 由调用者持有，每帧通过 [`GraphInfo`](crate::GraphInfo) 传入。

use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
};

use cadence_crate_tools::profile_scope;
use cadence_gfx::{GfxDevice, GfxImageCreateInfo, GfxResult, ImageHandle};

use crate::{graph::GraphDecl, image::ImageId, resource_state::RgImageState};

/// 物理 image 的 key：声明它的 component 名与 image 名
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    pub component: String,
    pub image: String,
}

impl StorageKey {
    pub fn new(component: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            image: image.into(),
        }
    }

    pub(crate) fn of(decl: &GraphDecl, image: ImageId) -> Self {
        let node = &decl.images[image];
        Self::new(decl.components[node.component.0].name.as_str(), node.name.as_str())
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.component, self.image)
    }
}

struct StorageEntry {
    handle: ImageHandle,
    info: GfxImageCreateInfo,
    hash: u64,
    /// 上一帧结束时的状态
    state: RgImageState,
}

type ReleaseCallback = Box<dyn FnOnce(&mut dyn GfxDevice)>;

#[derive(Default)]
pub struct GraphStorage {
    entries: HashMap<StorageKey, StorageEntry>,
    release_callbacks: Vec<ReleaseCallback>,
}

// new & init
impl GraphStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册在 [`Self::release`] 时调用的回调，按注册的逆序执行
    pub fn add_release_callback(&mut self, callback: impl FnOnce(&mut dyn GfxDevice) + 'static) {
        self.release_callbacks.push(Box::new(callback));
    }

    /// 销毁所有物理 image 并执行 release 回调
    pub fn release(&mut self, device: &mut dyn GfxDevice) -> GfxResult<()> {
        device.wait_idle()?;
        for (key, entry) in self.entries.drain() {
            log::debug!("release image {key}");
            device.destroy_image(entry.handle);
        }
        while let Some(callback) = self.release_callbacks.pop() {
            callback(device);
        }
        Ok(())
    }
}

impl Drop for GraphStorage {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::warn!("GraphStorage dropped with {} live images, call release() first", self.entries.len());
        }
    }
}

// getters
impl GraphStorage {
    #[inline]
    pub fn handle(&self, key: &StorageKey) -> Option<ImageHandle> {
        self.entries.get(key).map(|entry| entry.handle)
    }

    #[inline]
    pub fn image_info(&self, key: &StorageKey) -> Option<&GfxImageCreateInfo> {
        self.entries.get(key).map(|entry| &entry.info)
    }

    #[inline]
    pub fn state(&self, key: &StorageKey) -> Option<RgImageState> {
        self.entries.get(key).map(|entry| entry.state)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// tools
impl GraphStorage {
    fn descriptor_hash(key: &StorageKey, info: &GfxImageCreateInfo) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        info.hash(&mut hasher);
        hasher.finish()
    }

    /// 已缓存的 image 按 usage 取并集、尺寸取最大值，避免需求收窄时反复重建
    pub fn generalize(&self, key: &StorageKey, required: &GfxImageCreateInfo) -> GfxImageCreateInfo {
        let Some(entry) = self.entries.get(key) else {
            return *required;
        };
        GfxImageCreateInfo {
            usage: entry.info.usage | required.usage,
            width: entry.info.width.max(required.width),
            height: entry.info.height.max(required.height),
            ..*required
        }
    }

    /// 本帧开始时 image 的状态；需要重建的 image 从 `UNDEFINED` 开始
    pub fn peek_state(&self, key: &StorageKey, info: &GfxImageCreateInfo) -> RgImageState {
        match self.entries.get(key) {
            Some(entry) if entry.hash == Self::descriptor_hash(key, info) => entry.state,
            _ => RgImageState::UNDEFINED,
        }
    }

    /// 确保 key 对应的物理 image 存在且满足 `info`（应当已经 generalize）
    ///
    /// 描述发生变化时先等待 GPU 空闲，再销毁旧 image 并重建。
    pub fn get_or_create(
        &mut self,
        device: &mut dyn GfxDevice,
        key: &StorageKey,
        info: &GfxImageCreateInfo,
    ) -> GfxResult<ImageHandle> {
        profile_scope!("GraphStorage::get_or_create");

        let hash = Self::descriptor_hash(key, info);
        if let Some(entry) = self.entries.get(key) {
            if entry.hash == hash {
                return Ok(entry.handle);
            }
        }

        if let Some(old) = self.entries.remove(key) {
            log::debug!(
                "recreate image {key}: {}x{} {:?} -> {}x{} {:?}",
                old.info.width,
                old.info.height,
                old.info.format,
                info.width,
                info.height,
                info.format
            );
            device.wait_idle()?;
            device.destroy_image(old.handle);
        } else {
            log::debug!("create image {key}: {}x{} {:?}", info.width, info.height, info.format);
        }

        let handle = device.create_image(info, &key.to_string())?;
        self.entries.insert(
            key.clone(),
            StorageEntry {
                handle,
                info: *info,
                hash,
                state: RgImageState::UNDEFINED,
            },
        );
        Ok(handle)
    }

    /// 记录 image 在本帧结束时的状态，下一帧的第一个 barrier 从这里开始
    pub fn set_state(&mut self, key: &StorageKey, state: RgImageState) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.state = state;
        }
    }
}
