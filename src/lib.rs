//! rsadrules - 广告过滤规则聚合流水线
//! 拉取多个远程规则源并合并本地自定义规则，去重排序后提取纯域名列表，
//! 最终编译为代理工具使用的二进制规则集

// 导出全局错误类型
pub use self::error::{RsadrulesError, RsadResult, Stage};

// 导出配置模块
pub use self::config::{
    ConfigManager, ConverterConfig, CustomConfigBuilder, GlobalConfig, SorterConfig, SourceEntry,
};

// 导出规则源模块核心接口
pub use self::source::{
    fetch_all, Aggregate, FetchFailure, FetchOutcome, FetchedSource, HttpFetcher, RuleFetcher,
    RuleSource,
};

// 导出协作者接口
pub use self::sorter::{build_sorter, BuiltinSorter, CommandSorter, RuleSorter};
pub use self::converter::{
    build_converter, CommandConverter, CompiledRuleset, MsgpackConverter, RulesetConverter,
};

// 导出提取与发布接口
pub use self::extractor::{DomainExtractor, DomainLists, ExtractStats, LineVerdict, DOMAIN_SET_MARKER};
pub use self::publisher::{Artifact, Publisher, Workspace};
pub use self::pipeline::{Pipeline, PipelineReport};

// 声明所有子模块
pub mod config;
pub mod error;
pub mod source;
pub mod command;
pub mod sorter;
pub mod extractor;
pub mod converter;
pub mod publisher;
pub mod pipeline;
