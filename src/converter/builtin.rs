//! 内置规则集格式
//! 仅处理域名集合的 MessagePack 序列化与反序列化

use std::path::Path;

use async_trait::async_trait;
use rmp_serde::{from_slice, Serializer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RulesetConverter;
use crate::error::{RsadResult, RsadrulesError};

/// 当前规则集格式版本
pub const RULESET_VERSION: u8 = 1;

/// 编译后的规则集
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRuleset {
    pub version: u8,
    /// 匹配行为（固定为 domain）
    pub behavior: String,
    /// 域名集合条目，保持输入顺序
    pub entries: Vec<String>,
}

impl CompiledRuleset {
    pub fn from_domain_set(text: &str) -> Self {
        Self {
            version: RULESET_VERSION,
            behavior: "domain".to_string(),
            entries: text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn to_bytes(&self) -> RsadResult<Vec<u8>> {
        let mut data = Vec::new();
        self.serialize(&mut Serializer::new(&mut data))
            .map_err(|e| RsadrulesError::MsgPackError(format!("序列化失败：{}", e)))?;
        Ok(data)
    }

    /// 从规则集文件加载
    pub async fn load(path: &Path) -> RsadResult<Self> {
        let data = tokio::fs::read(path).await?;
        let ruleset: CompiledRuleset = from_slice(&data)
            .map_err(|e| RsadrulesError::MsgPackError(format!("反序列化失败：{}", e)))?;
        Ok(ruleset)
    }
}

/// 内置 MessagePack 转换器
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackConverter;

#[async_trait]
impl RulesetConverter for MsgpackConverter {
    async fn convert(&self, input: &Path, output: &Path) -> RsadResult<()> {
        let text = tokio::fs::read_to_string(input).await?;
        let ruleset = CompiledRuleset::from_domain_set(&text);
        let data = ruleset.to_bytes()?;

        debug!("规则集序列化成功，条目数：{}，数据大小：{} 字节", ruleset.entries.len(), data.len());

        tokio::fs::write(output, data).await?;
        Ok(())
    }
}
