//! 外部排序程序

use std::path::Path;

use async_trait::async_trait;

use super::RuleSorter;
use crate::command::{expand_placeholders, run_collaborator};
use crate::error::RsadResult;

/// 调用外部排序脚本（如 `python3 sort.py {path}`）原地改写规则文件
#[derive(Debug, Clone)]
pub struct CommandSorter {
    program: String,
    args: Vec<String>,
}

impl CommandSorter {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

#[async_trait]
impl RuleSorter for CommandSorter {
    async fn sort_in_place(&self, path: &Path) -> RsadResult<()> {
        let args = expand_placeholders(&self.args, &[("{path}", path)]);
        run_collaborator("sorter", &self.program, &args).await
    }
}
