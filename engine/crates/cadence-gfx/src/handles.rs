use slotmap::new_key_type;

new_key_type! {
    /// 物理 Image Handle
    ///
    /// 由 [`GfxDevice`](crate::GfxDevice) 分配，指向一个 GPU Image 资源（包含其默认 view）。
    pub struct ImageHandle;
}
