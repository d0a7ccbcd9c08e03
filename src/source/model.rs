//! 规则源数据模型

/// 远程规则源（不可变，由配置生成）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSource {
    /// 规则名称（用于日志输出）
    pub name: String,
    /// 原始URL
    pub url: String,
    /// 合并顺序
    pub order: usize,
}

impl RuleSource {
    pub fn new(name: &str, url: &str, order: usize) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            order,
        }
    }

    /// 构建代理URL（代理前缀为空时返回 None）
    pub fn proxy_url(&self, gh_proxy_url: &str) -> Option<String> {
        if gh_proxy_url.trim().is_empty() {
            return None;
        }
        let proxy_path = self
            .url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        Some(format!("{}{}", gh_proxy_url, proxy_path))
    }
}
