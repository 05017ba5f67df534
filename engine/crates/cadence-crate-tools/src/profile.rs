/// 在当前作用域内打开一个 tracy span
///
/// 只有在 tracy client 已经启动时才会真正记录，否则什么也不做，
/// 因此可以在测试和 headless 工具中放心使用。
///
/// ```ignore
/// cadence_crate_tools::profile_scope!("RenderGraph::compile");
/// ```
#[macro_export]
macro_rules! profile_scope {
    ($name:literal) => {
        let _profile_span = $crate::tracy_client::Client::running()
            .map(|client| client.span($crate::tracy_client::span_location!($name), 0));
    };
}
