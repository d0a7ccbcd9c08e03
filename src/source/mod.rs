//! 规则源模块：负责规则源定义、远程拉取与聚合缓冲
pub mod model;
pub mod fetcher;
pub mod aggregate;

// 导出核心接口
pub use self::model::RuleSource;
pub use self::fetcher::{
    fetch_all, FetchFailure, FetchOutcome, FetchedSource, HttpFetcher, RuleFetcher,
};
pub use self::aggregate::Aggregate;
