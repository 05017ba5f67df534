use std::path::PathBuf;

use serde::Deserialize;

/// 帧图的运行时配置
///
/// 可以从 TOML 读取，缺省字段使用默认值：
///
/// ```toml
/// dot_path = "target/render_graph.dot"
/// log_execution_plan = false
/// fold_attachment_transitions = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderGraphSettings {
    /// `submit(save = true)` 时 dot 文件的输出路径
    pub dot_path: PathBuf,
    /// submit 时是否打印执行计划
    pub log_execution_plan: bool,
    /// 相邻 pass 之间的 attachment 转换是否折叠进 render pass 的 initial layout
    pub fold_attachment_transitions: bool,
}

impl Default for RenderGraphSettings {
    fn default() -> Self {
        Self {
            dot_path: PathBuf::from("render_graph.dot"),
            log_execution_plan: false,
            fold_attachment_transitions: true,
        }
    }
}

impl RenderGraphSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_uses_defaults() {
        let settings = RenderGraphSettings::from_toml_str("log_execution_plan = true").unwrap();
        assert!(settings.log_execution_plan);
        assert!(settings.fold_attachment_transitions);
        assert_eq!(settings.dot_path, PathBuf::from("render_graph.dot"));
    }

    #[test]
    fn full_toml() {
        let settings = RenderGraphSettings::from_toml_str(
            r#"
            dot_path = "out/frame.dot"
            log_execution_plan = false
            fold_attachment_transitions = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.dot_path, PathBuf::from("out/frame.dot"));
        assert!(!settings.fold_attachment_transitions);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(RenderGraphSettings::from_toml_str("log_execution_plan = 3").is_err());
    }
}
