//! 内置排序器
//! 过滤注释与非 `||domain^` 规则，剔除指定国家代码后缀的域名，
//! 去重后按次级域名排序，并写入文件头部信息

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use super::RuleSorter;
use crate::error::RsadResult;

/// 剔除的国家代码后缀（不含国际域名和中国域名）
pub const COUNTRY_SUFFIXES: &[&str] = &[
    "jp", "kr", "pl", "uk", "de", "fr", "it", "ru", "es", "ca", "au", "ch", "se", "br", "za", "in", "id", "vn", "th", "my",
    "ar", "mx", "ph", "cl", "nz", "pt", "be", "no", "fi", "gr", "tr", "sa", "ae", "hk", "sg", "tw", "dk", "ie", "cz", "hu",
    "ro", "bg", "sk", "lt", "lv", "ee", "is", "mt", "cy", "rs", "si", "hr", "ba", "mk", "me", "al", "ge", "am", "az", "by",
    "kg", "kz", "md", "tj", "tm", "uz", "ua", "pk", "np", "lk", "bd", "kh", "la", "mm", "bt", "bn", "mn", "af", "ir", "iq",
    "jo", "lb", "om", "qa", "kw", "bh", "ye", "sy", "ps", "dz", "ma", "tn", "ly", "eg", "sd", "et", "ng", "gh", "ci", "sn",
    "ke", "tz", "ug", "zm", "zw", "mw", "bw", "na", "sz", "ls", "mg", "mu", "sc", "cv", "gw", "gq", "st", "ga", "cg", "cd",
    "ao", "cm", "ne", "bf", "ml", "td", "mr", "sl", "lr", "gm", "gn", "bj", "tg", "bi", "rw", "so", "dj", "er", "ss",
];

static ADBLOCK_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\|\|[^\^]+?\^$").expect("规则格式正则非法")
});

static COUNTRY_SUFFIX_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\.({})\^$", COUNTRY_SUFFIXES.join("|"))).expect("国家后缀正则非法")
});

/// 内置排序器
#[derive(Debug, Clone)]
pub struct BuiltinSorter {
    header: bool,
    exclude_country_suffixes: bool,
}

impl Default for BuiltinSorter {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl BuiltinSorter {
    pub fn new(header: bool, exclude_country_suffixes: bool) -> Self {
        Self {
            header,
            exclude_country_suffixes,
        }
    }

    /// 过滤、去重并排序规则
    pub fn optimize<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut rules: Vec<String> = lines
            .into_iter()
            .map(str::trim)
            .filter(|line| !line.is_empty() && self.keep_rule(line))
            .filter(|line| seen.insert(*line))
            .map(str::to_string)
            .collect();

        sort_rules(&mut rules);
        rules
    }

    fn keep_rule(&self, line: &str) -> bool {
        // 注释与元信息
        if line.starts_with('!') || line.starts_with('[') {
            return false;
        }
        if self.exclude_country_suffixes && COUNTRY_SUFFIX_RULE.is_match(line) {
            return false;
        }
        ADBLOCK_RULE.is_match(line)
    }

    /// 生成完整的输出文本
    pub fn render(&self, content: &str, file_name: &str, now: DateTime<Local>) -> String {
        let rules = self.optimize(content.lines());

        let mut output = Vec::with_capacity(rules.len() + 7);
        if self.header {
            output.extend(header_lines(file_name, rules.len(), now));
        }
        output.extend(rules);

        if output.is_empty() {
            return String::new();
        }
        let mut text = output.join("\n");
        text.push('\n');
        text
    }
}

#[async_trait]
impl RuleSorter for BuiltinSorter {
    async fn sort_in_place(&self, path: &Path) -> RsadResult<()> {
        let bytes = tokio::fs::read(path).await?;
        let content = String::from_utf8_lossy(&bytes);

        let file_name = path.display().to_string();
        let output = self.render(&content, &file_name, Local::now());
        tokio::fs::write(path, output.as_bytes()).await?;

        let total = output.lines().filter(|line| !line.starts_with('!')).count();
        info!("文件 {} 已成功优化，共处理 {} 条规则", file_name, total);
        Ok(())
    }
}

/// 提取规则中的域名部分
fn rule_domain(rule: &str) -> &str {
    let tail = rule.rsplit("||").next().unwrap_or(rule);
    tail.split('^').next().unwrap_or(tail)
}

/// 按次级域名排序（忽略顶级域名），次级域名相同则按完整域名排序；稳定排序
pub fn sort_rules(rules: &mut [String]) {
    fn sorting_key(rule: &str) -> (&str, &str) {
        let domain = rule_domain(rule);
        let mut labels = domain.rsplit('.');
        let last = labels.next().unwrap_or(domain);
        let second_level = labels.next().unwrap_or(last);
        (second_level, domain)
    }

    rules.sort_by(|a, b| sorting_key(a).cmp(&sorting_key(b)));
}

fn header_lines(file_name: &str, rule_count: usize, now: DateTime<Local>) -> Vec<String> {
    vec![
        "! Title: Optimized Adblock Rules".to_string(),
        "! Description: This is an optimized adblock filter list.".to_string(),
        format!("! Source file: {}", file_name),
        format!("! Version: {}", now.format("%Y%m%d%H%M%S")),
        format!("! Last Modified: {}", now.format("%Y-%m-%d %H:%M:%S")),
        format!("! Total Rules: {}", rule_count),
        "!".to_string(),
    ]
}
