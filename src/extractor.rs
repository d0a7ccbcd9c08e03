//! 域名提取模块
//! 从去重排序后的规则中筛出拦截规则 `||domain^`，提取纯域名列表，
//! 并生成带 `+.` 前缀的域名集合列表（匹配域名本身及其全部子域名）

use once_cell::sync::Lazy;
use regex::Regex;

/// 域名集合前缀
pub const DOMAIN_SET_MARKER: &str = "+.";

/// 例外规则标记
const EXCEPTION_MARKER: char = '@';
/// 通配符标记
const WILDCARD_MARKER: char = '*';

/// 拦截规则：前后均锚定，域名部分不含 `^`、空白、`|`、`/`
static BLOCKING_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\|\|([^\^\s|/]+)\^$").expect("拦截规则正则非法")
});

/// 单行规则的判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineVerdict<'a> {
    /// 可提取的拦截域名
    Domain(&'a str),
    /// 含 `@` 的例外规则
    Exception,
    /// 含 `*` 的通配规则
    Wildcard,
    /// 不符合 `||domain^` 形态（注释、空行、带修饰符的规则等）
    Malformed,
}

/// 提取统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub kept: usize,
    pub exception: usize,
    pub wildcard: usize,
    pub malformed: usize,
}

impl ExtractStats {
    pub fn skipped(&self) -> usize {
        self.exception + self.wildcard + self.malformed
    }
}

/// 提取结果：两个列表等长且顺序一致
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainLists {
    pub domains: Vec<String>,
    pub domain_set: Vec<String>,
    pub stats: ExtractStats,
}

impl DomainLists {
    /// 纯域名列表文本（每行一个，换行结尾）
    pub fn domains_text(&self) -> String {
        join_lines(&self.domains)
    }

    /// 域名集合列表文本，作为规则集转换器的输入
    pub fn domain_set_text(&self) -> String {
        join_lines(&self.domain_set)
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// 域名提取工具
pub struct DomainExtractor;

impl DomainExtractor {
    /// 判定单行规则
    ///
    /// 整行出现 `@` 或 `*` 即丢弃（不论是否位于域名部分）；
    /// 其余行必须完整匹配 `||domain^` 才能产出域名
    pub fn classify(line: &str) -> LineVerdict<'_> {
        if line.contains(EXCEPTION_MARKER) {
            return LineVerdict::Exception;
        }
        if line.contains(WILDCARD_MARKER) {
            return LineVerdict::Wildcard;
        }

        match BLOCKING_RULE.captures(line).and_then(|caps| caps.get(1)) {
            // 提取值仍含通配符时显式丢弃
            Some(domain) if domain.as_str().contains(WILDCARD_MARKER) => LineVerdict::Wildcard,
            Some(domain) => LineVerdict::Domain(domain.as_str()),
            None => LineVerdict::Malformed,
        }
    }

    /// 提取单行中的域名
    pub fn extract_domain(line: &str) -> Option<&str> {
        match Self::classify(line) {
            LineVerdict::Domain(domain) => Some(domain),
            _ => None,
        }
    }

    /// 从规则文本提取域名列表与域名集合列表，保留原有行序
    pub fn extract(rules: &str) -> DomainLists {
        let mut lists = DomainLists::default();

        for line in rules.lines() {
            match Self::classify(line) {
                LineVerdict::Domain(domain) => {
                    lists.domain_set.push(to_domain_set_entry(domain));
                    lists.domains.push(domain.to_string());
                    lists.stats.kept += 1;
                }
                LineVerdict::Exception => lists.stats.exception += 1,
                LineVerdict::Wildcard => lists.stats.wildcard += 1,
                LineVerdict::Malformed => lists.stats.malformed += 1,
            }
        }

        lists
    }
}

/// 域名 -> 域名集合条目
pub fn to_domain_set_entry(domain: &str) -> String {
    format!("{}{}", DOMAIN_SET_MARKER, domain)
}

fn join_lines(lines: &[String]) -> String {
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}
