//! 规则集转换模块：将域名集合列表编译为二进制规则集
pub mod builtin;
pub mod command;

use std::path::Path;

use async_trait::async_trait;

use crate::config::ConverterConfig;
use crate::error::RsadResult;

pub use self::builtin::{CompiledRuleset, MsgpackConverter};
pub use self::command::CommandConverter;

/// 规则集转换能力
/// 约定：相同输入产出相同结果
#[async_trait]
pub trait RulesetConverter: Send + Sync {
    async fn convert(&self, input: &Path, output: &Path) -> RsadResult<()>;
}

/// 按配置创建转换器
pub fn build_converter(config: &ConverterConfig) -> Box<dyn RulesetConverter> {
    match config {
        ConverterConfig::Builtin => Box::new(MsgpackConverter),
        ConverterConfig::Command { program, args } => Box::new(CommandConverter::new(program, args.clone())),
    }
}
