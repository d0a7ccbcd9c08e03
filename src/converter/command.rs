//! 外部规则集转换程序

use std::path::Path;

use async_trait::async_trait;

use super::RulesetConverter;
use crate::command::{expand_placeholders, run_collaborator};
use crate::error::{RsadResult, RsadrulesError};

/// 调用外部转换工具，如 `mihomo convert-ruleset domain text {input} {output}`
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

#[async_trait]
impl RulesetConverter for CommandConverter {
    async fn convert(&self, input: &Path, output: &Path) -> RsadResult<()> {
        let args = expand_placeholders(&self.args, &[("{input}", input), ("{output}", output)]);
        run_collaborator("converter", &self.program, &args).await?;

        // 退出码为 0 但未产出文件同样视为失败
        if !tokio::fs::try_exists(output).await? {
            return Err(RsadrulesError::CollaboratorFailure {
                collaborator: "converter".to_string(),
                detail: format!("{} 未生成输出文件 {}", self.program, output.display()),
            });
        }
        Ok(())
    }
}
