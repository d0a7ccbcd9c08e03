//! 全局配置管理,存储所有可配置项
//! 支持默认配置、构建器和 JSON 配置文件三种来源

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{RsadResult, RsadrulesError};
use crate::source::RuleSource;

/// 远程规则源条目（配置文件中的顺序即合并顺序）
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub url: String,
}

impl SourceEntry {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// 去重排序器配置
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SorterConfig {
    /// 内置排序器
    Builtin {
        #[serde(default = "default_true")]
        header: bool,
        #[serde(default = "default_true")]
        exclude_country_suffixes: bool,
    },
    /// 外部命令，`{path}` 占位符替换为规则文件路径
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Default for SorterConfig {
    fn default() -> Self {
        SorterConfig::Builtin {
            header: true,
            exclude_country_suffixes: true,
        }
    }
}

/// 规则集转换器配置
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConverterConfig {
    /// 内置 MessagePack 规则集
    #[default]
    Builtin,
    /// 外部命令，`{input}` / `{output}` 占位符分别替换为输入输出路径
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// 全局配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    // 远程规则源（按顺序合并）
    pub sources: Vec<SourceEntry>,
    // 本地自定义规则文件
    pub custom_rules_path: PathBuf,
    // 发布目录
    pub rules_dir: PathBuf,
    // 中间文件目录
    pub work_dir: PathBuf,
    // 发布产物文件名
    pub merged_file_name: String,
    pub ruleset_file_name: String,
    // 单个规则源超时（单位：秒）
    pub http_timeout: u64,
    // 单个规则源重试次数
    pub retries: usize,
    // GitHub代理URL（为空则不使用代理回退）
    pub gh_proxy_url: String,
    // 并发拉取数（结果顺序与配置一致）
    pub fetch_concurrency: usize,
    // 全部远程源失败时是否中止
    pub require_any_source: bool,
    pub sorter: SorterConfig,
    pub converter: ConverterConfig,
    // 是否启用详细日志
    pub verbose: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceEntry::new(
                    "adguard-dns",
                    "https://adguardteam.github.io/AdGuardSDNSFilter/Filters/filter.txt",
                ),
                SourceEntry::new(
                    "hagezi-pro",
                    "https://raw.githubusercontent.com/hagezi/dns-blocklists/main/adblock/pro.txt",
                ),
            ],
            custom_rules_path: PathBuf::from("custom.txt"),
            rules_dir: PathBuf::from("rules"),
            work_dir: std::env::temp_dir().join("rsadrules"),
            merged_file_name: "adblock.txt".to_string(),
            ruleset_file_name: "adblock.mrs".to_string(),
            http_timeout: 30,
            retries: 1,
            gh_proxy_url: "https://ghfast.top/".to_string(),
            fetch_concurrency: 4,
            require_any_source: true,
            sorter: SorterConfig::default(),
            converter: ConverterConfig::default(),
            verbose: false,
        }
    }
}

impl GlobalConfig {
    /// 从 JSON 配置文件加载（缺失字段使用默认值）
    pub fn load_from_file(path: &Path) -> RsadResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RsadrulesError::ConfigError(format!("读取配置文件 {} 失败：{}", path.display(), e))
        })?;
        let config: GlobalConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> RsadResult<()> {
        if self.fetch_concurrency == 0 {
            return Err(RsadrulesError::ConfigError("fetch_concurrency 必须大于 0".to_string()));
        }
        if self.http_timeout == 0 {
            return Err(RsadrulesError::ConfigError("http_timeout 必须大于 0".to_string()));
        }
        for file_name in [&self.merged_file_name, &self.ruleset_file_name] {
            if file_name.is_empty() || file_name.contains(['/', '\\']) {
                return Err(RsadrulesError::ConfigError(format!("无效的产物文件名：{:?}", file_name)));
            }
        }
        if self.merged_file_name == self.ruleset_file_name {
            return Err(RsadrulesError::ConfigError("两个产物文件名不能相同".to_string()));
        }
        for entry in &self.sources {
            if entry.name.trim().is_empty() {
                return Err(RsadrulesError::ConfigError(format!("规则源缺少名称：{}", entry.url)));
            }
            let url = Url::parse(&entry.url)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(RsadrulesError::ConfigError(format!(
                    "规则源 [{}] 协议不支持：{}",
                    entry.name,
                    url.scheme()
                )));
            }
        }
        Ok(())
    }

    /// 按配置顺序生成规则源
    pub fn rule_sources(&self) -> Vec<RuleSource> {
        self.sources
            .iter()
            .enumerate()
            .map(|(order, entry)| RuleSource::new(&entry.name, &entry.url, order))
            .collect()
    }

    /// 单个规则源的总时限（覆盖全部重试与代理回退，每次重试另计1秒间隔）
    pub fn source_deadline(&self) -> Duration {
        let urls = if self.gh_proxy_url.trim().is_empty() { 1 } else { 2 };
        let attempts = (self.retries as u64).saturating_add(1).saturating_mul(urls);
        Duration::from_secs(self.http_timeout.saturating_mul(attempts).saturating_add(attempts))
    }

    pub fn merged_output_path(&self) -> PathBuf {
        self.rules_dir.join(&self.merged_file_name)
    }

    pub fn ruleset_output_path(&self) -> PathBuf {
        self.rules_dir.join(&self.ruleset_file_name)
    }
}

fn default_true() -> bool {
    true
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> GlobalConfig {
        GlobalConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone)]
pub struct CustomConfigBuilder {
    config: GlobalConfig,
}

impl Default for CustomConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GlobalConfig::default(),
        }
    }

    pub fn from_config(config: GlobalConfig) -> Self {
        Self { config }
    }

    pub fn sources(mut self, sources: Vec<SourceEntry>) -> Self {
        self.config.sources = sources;
        self
    }

    pub fn source(mut self, name: &str, url: &str) -> Self {
        self.config.sources.push(SourceEntry::new(name, url));
        self
    }

    pub fn custom_rules_path(mut self, path: PathBuf) -> Self {
        self.config.custom_rules_path = path;
        self
    }

    pub fn rules_dir(mut self, dir: PathBuf) -> Self {
        self.config.rules_dir = dir;
        self
    }

    pub fn work_dir(mut self, dir: PathBuf) -> Self {
        self.config.work_dir = dir;
        self
    }

    pub fn http_timeout(mut self, timeout: u64) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn gh_proxy_url(mut self, url: String) -> Self {
        self.config.gh_proxy_url = url;
        self
    }

    pub fn fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.config.fetch_concurrency = concurrency;
        self
    }

    pub fn require_any_source(mut self, required: bool) -> Self {
        self.config.require_any_source = required;
        self
    }

    pub fn sorter(mut self, sorter: SorterConfig) -> Self {
        self.config.sorter = sorter;
        self
    }

    pub fn converter(mut self, converter: ConverterConfig) -> Self {
        self.config.converter = converter;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn build(self) -> GlobalConfig {
        self.config
    }
}
