//! 去重排序模块：消费聚合规则文件，原地改写为去重、排序后的规则
pub mod builtin;
pub mod command;

use std::path::Path;

use async_trait::async_trait;

use crate::config::SorterConfig;
use crate::error::RsadResult;

pub use self::builtin::BuiltinSorter;
pub use self::command::CommandSorter;

/// 去重排序能力
/// 约定：幂等、全序、不丢失不同的规则行
#[async_trait]
pub trait RuleSorter: Send + Sync {
    async fn sort_in_place(&self, path: &Path) -> RsadResult<()>;
}

/// 按配置创建排序器
pub fn build_sorter(config: &SorterConfig) -> Box<dyn RuleSorter> {
    match config {
        SorterConfig::Builtin { header, exclude_country_suffixes } => {
            Box::new(BuiltinSorter::new(*header, *exclude_country_suffixes))
        }
        SorterConfig::Command { program, args } => Box::new(CommandSorter::new(program, args.clone())),
    }
}
