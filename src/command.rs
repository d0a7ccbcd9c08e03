//! 外部协作程序调用（排序脚本、规则集转换工具）

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::{RsadResult, RsadrulesError};

/// 替换参数中的占位符；所有占位符都未出现时按顺序把路径追加到参数末尾
pub fn expand_placeholders(args: &[String], placeholders: &[(&str, &Path)]) -> Vec<String> {
    let mut used = false;
    let mut expanded: Vec<String> = args
        .iter()
        .map(|arg| {
            let mut arg = arg.clone();
            for (key, path) in placeholders {
                if arg.contains(key) {
                    arg = arg.replace(key, &path.to_string_lossy());
                    used = true;
                }
            }
            arg
        })
        .collect();

    if !used {
        expanded.extend(placeholders.iter().map(|(_, path)| path.to_string_lossy().into_owned()));
    }
    expanded
}

/// 运行外部程序，启动失败或非零退出均视为协作程序失败
pub async fn run_collaborator(collaborator: &str, program: &str, args: &[String]) -> RsadResult<()> {
    debug!("执行 {}：{} {}", collaborator, program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| RsadrulesError::CollaboratorFailure {
            collaborator: collaborator.to_string(),
            detail: format!("无法启动 {}：{}", program, e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RsadrulesError::CollaboratorFailure {
            collaborator: collaborator.to_string(),
            detail: format!("{} 退出状态 {}：{}", program, output.status, stderr.trim()),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!("{} 输出：{}", collaborator, stdout.trim());
    }
    Ok(())
}
