//! 聚合缓冲
//! 所有规则源按顺序追加，最后追加本地自定义规则；去重排序前只允许追加

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::{RsadResult, RsadrulesError};

/// 聚合规则缓冲（唯一写入者，以引用在各阶段间传递）
#[derive(Debug, Default, Clone)]
pub struct Aggregate {
    buffer: String,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一段规则内容，保证追加后以换行结尾
    pub fn append(&mut self, content: &str) {
        if content.is_empty() {
            return;
        }
        self.buffer.push_str(content);
        if !content.ends_with('\n') {
            self.buffer.push('\n');
        }
    }

    /// 追加本地自定义规则文件（文件缺失为致命错误），返回追加的行数
    pub async fn append_custom_rules(&mut self, path: &Path) -> RsadResult<usize> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RsadrulesError::MissingCustomRules(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let content = String::from_utf8_lossy(&bytes);
        let lines = content.lines().count();
        self.append(&content);
        debug!("已追加自定义规则 {}，共 {} 行", path.display(), lines);
        Ok(lines)
    }

    /// 统一换行符：移除全部回车符，返回移除数量
    pub fn normalize_line_endings(&mut self) -> usize {
        let removed = self.buffer.matches('\r').count();
        if removed > 0 {
            self.buffer.retain(|c| c != '\r');
        }
        removed
    }

    pub fn line_count(&self) -> usize {
        self.buffer.lines().count()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 落盘，供外部排序器使用
    pub async fn write_to(&self, path: &Path) -> RsadResult<()> {
        tokio::fs::write(path, self.buffer.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_line_count_is_sum_of_segments() {
        let sources = ["||a.com^\n||b.com^\n", "||c.com^", "! comment\r\n||d.com^\r\n"];
        let custom = "||custom.com^\n@@||allow.com^";

        let mut aggregate = Aggregate::new();
        for content in sources {
            aggregate.append(content);
        }
        aggregate.append(custom);

        let expected: usize = sources.iter().chain([&custom]).map(|s| s.lines().count()).sum();
        assert_eq!(aggregate.line_count(), expected);
        // 无换行结尾的片段不会与下一段拼接到同一行
        assert!(aggregate.as_str().contains("||c.com^\n! comment"));
    }

    #[test]
    fn test_empty_content_adds_nothing() {
        let mut aggregate = Aggregate::new();
        aggregate.append("");
        assert!(aggregate.is_empty());
    }

    #[test]
    fn test_normalize_line_endings() {
        let mut aggregate = Aggregate::new();
        aggregate.append("||a.com^\r\n||b.com^\r\n");
        aggregate.append("||a.com^\n");

        assert_eq!(aggregate.normalize_line_endings(), 2);
        assert_eq!(aggregate.as_str(), "||a.com^\n||b.com^\n||a.com^\n");
        assert_eq!(aggregate.normalize_line_endings(), 0);
    }

    #[tokio::test]
    async fn test_missing_custom_rules_is_fatal() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let mut aggregate = Aggregate::new();

        let err = aggregate
            .append_custom_rules(&dir.join("custom.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, RsadrulesError::MissingCustomRules(_)));
        assert!(aggregate.is_empty());
    }

    #[tokio::test]
    async fn test_append_custom_rules_keeps_order() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let path = dir.join("custom.txt");
        std::fs::write(&path, "||z.com^\n||a.com^\n").unwrap();

        let mut aggregate = Aggregate::new();
        aggregate.append("||remote.com^\n");
        let lines = aggregate.append_custom_rules(&path).await.unwrap();

        assert_eq!(lines, 2);
        assert_eq!(aggregate.as_str(), "||remote.com^\n||z.com^\n||a.com^\n");
    }
}
