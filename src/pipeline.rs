//! 规则聚合流水线
//! 拉取 -> 合并 -> 换行统一 -> 去重排序 -> 域名提取 -> 规则集转换 -> 发布，
//! 各阶段严格串行，前一阶段产物完整落地后才进入下一阶段；
//! 任一必需阶段失败都不会触及已发布的旧产物

use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info};

use crate::config::GlobalConfig;
use crate::converter::{build_converter, RulesetConverter};
use crate::error::{RsadResult, RsadrulesError, Stage};
use crate::extractor::{DomainExtractor, ExtractStats};
use crate::publisher::{remove_quietly, Artifact, Publisher, Workspace};
use crate::sorter::{build_sorter, RuleSorter};
use crate::source::{fetch_all, Aggregate, FetchFailure, HttpFetcher, RuleFetcher};

const MERGED_STAGING: &str = "merged.txt";
const DOMAINS_STAGING: &str = "domains.txt";
const DOMAIN_SET_STAGING: &str = "domain_set.txt";
const RULESET_STAGING: &str = "ruleset.bin";

/// 单次运行报告
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// 成功拉取的规则源名称（按配置顺序）
    pub fetched: Vec<String>,
    pub failed: Vec<FetchFailure>,
    /// 去重排序前的聚合行数
    pub aggregate_lines: usize,
    pub carriage_returns_removed: usize,
    /// 去重排序后的行数（含排序器写入的注释头）
    pub sorted_lines: usize,
    pub extract: ExtractStats,
    pub published: Vec<PathBuf>,
}

/// 规则聚合流水线
pub struct Pipeline {
    config: GlobalConfig,
    fetcher: Box<dyn RuleFetcher>,
    sorter: Box<dyn RuleSorter>,
    converter: Box<dyn RulesetConverter>,
    source_deadline: Duration,
}

impl Pipeline {
    /// 按配置创建流水线（HTTP 拉取器 + 配置指定的排序器与转换器）
    pub fn new(config: GlobalConfig) -> RsadResult<Self> {
        config.validate()?;
        let fetcher = Box::new(HttpFetcher::new(&config)?);
        let sorter = build_sorter(&config.sorter);
        let converter = build_converter(&config.converter);
        Ok(Self::with_collaborators(config, fetcher, sorter, converter))
    }

    /// 注入自定义协作者
    pub fn with_collaborators(
        config: GlobalConfig,
        fetcher: Box<dyn RuleFetcher>,
        sorter: Box<dyn RuleSorter>,
        converter: Box<dyn RulesetConverter>,
    ) -> Self {
        let source_deadline = config.source_deadline();
        Self {
            config,
            fetcher,
            sorter,
            converter,
            source_deadline,
        }
    }

    /// 覆盖单个规则源的拉取时限
    pub fn with_source_deadline(mut self, deadline: Duration) -> Self {
        self.source_deadline = deadline;
        self
    }

    /// 执行完整流水线；无论成功与否都会清理中间文件
    pub async fn run(&self) -> RsadResult<PipelineReport> {
        let mut workspace = Workspace::create(&self.config.work_dir)
            .await
            .map_err(|e| e.at(Stage::Fetch))?;

        let result = self.run_stages(&mut workspace).await;
        workspace.cleanup().await;

        match &result {
            Ok(report) => info!(
                "流水线完成：规则源 {}/{}，聚合 {} 行，排序后 {} 行，域名 {} 个（跳过例外 {}、通配 {}、无效 {}）",
                report.fetched.len(),
                report.fetched.len() + report.failed.len(),
                report.aggregate_lines,
                report.sorted_lines,
                report.extract.kept,
                report.extract.exception,
                report.extract.wildcard,
                report.extract.malformed
            ),
            Err(e) => error!("流水线失败，已发布产物保持不变：{}", e),
        }
        result
    }

    async fn run_stages(&self, workspace: &mut Workspace) -> RsadResult<PipelineReport> {
        let mut report = PipelineReport::default();

        // 自定义规则缺失时不做任何下载
        let custom_path = &self.config.custom_rules_path;
        let custom_exists = tokio::fs::try_exists(custom_path)
            .await
            .map_err(|e| RsadrulesError::from(e).at(Stage::Merge))?;
        if !custom_exists {
            return Err(RsadrulesError::MissingCustomRules(custom_path.clone()).at(Stage::Merge));
        }

        // 1. 拉取
        let sources = self.config.rule_sources();
        info!("开始拉取 {} 个规则源", sources.len());
        let outcome = fetch_all(
            self.fetcher.as_ref(),
            &sources,
            self.source_deadline,
            self.config.fetch_concurrency,
        )
        .await;
        if self.config.require_any_source && !sources.is_empty() && outcome.fetched.is_empty() {
            return Err(RsadrulesError::AllSourcesFailed(sources.len()).at(Stage::Fetch));
        }

        let mut aggregate = Aggregate::new();
        for fetched in &outcome.fetched {
            aggregate.append(&fetched.content);
        }
        report.fetched = outcome.fetched.iter().map(|f| f.source.name.clone()).collect();
        report.failed = outcome.failed;

        // 2. 合并自定义规则
        aggregate
            .append_custom_rules(custom_path)
            .await
            .map_err(|e| e.at(Stage::Merge))?;

        // 3. 统一换行符
        report.carriage_returns_removed = aggregate.normalize_line_endings();
        report.aggregate_lines = aggregate.line_count();
        info!("聚合完成，共 {} 行", report.aggregate_lines);

        // 4. 去重排序
        let merged_path = workspace.transient(MERGED_STAGING);
        aggregate
            .write_to(&merged_path)
            .await
            .map_err(|e| e.at(Stage::Sort))?;
        drop(aggregate);
        self.sorter
            .sort_in_place(&merged_path)
            .await
            .map_err(|e| e.at(Stage::Sort))?;

        // 5. 域名提取
        let sorted = tokio::fs::read(&merged_path)
            .await
            .map_err(|e| RsadrulesError::from(e).at(Stage::Extract))?;
        let sorted = String::from_utf8_lossy(&sorted);
        report.sorted_lines = sorted.lines().count();

        let lists = DomainExtractor::extract(&sorted);
        report.extract = lists.stats;
        info!("提取域名 {} 个，跳过 {} 行", lists.stats.kept, lists.stats.skipped());

        let domains_path = workspace.transient(DOMAINS_STAGING);
        let domain_set_path = workspace.transient(DOMAIN_SET_STAGING);
        tokio::fs::write(&domains_path, lists.domains_text())
            .await
            .map_err(|e| RsadrulesError::from(e).at(Stage::Extract))?;
        tokio::fs::write(&domain_set_path, lists.domain_set_text())
            .await
            .map_err(|e| RsadrulesError::from(e).at(Stage::Extract))?;

        // 6. 规则集转换
        let ruleset_path = workspace.transient(RULESET_STAGING);
        // 上次中断运行遗留的产物不能冒充本次输出
        remove_quietly(&ruleset_path).await;
        self.converter
            .convert(&domain_set_path, &ruleset_path)
            .await
            .map_err(|e| e.at(Stage::Convert))?;

        // 7. 发布
        report.published = Publisher::publish(&[
            Artifact::new(merged_path, self.config.merged_output_path()),
            Artifact::new(ruleset_path, self.config.ruleset_output_path()),
        ])
        .await
        .map_err(|e| e.at(Stage::Publish))?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::{ConfigManager, SourceEntry};
    use crate::converter::{CommandConverter, CompiledRuleset, MsgpackConverter};
    use crate::source::RuleSource;
    use tempfile::TempDir;

    enum Reply {
        Body(&'static str),
        Hang,
        NotFound,
    }

    struct FakeFetcher {
        replies: HashMap<&'static str, Reply>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeFetcher {
        fn new(replies: Vec<(&'static str, Reply)>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fetcher = Self {
                replies: replies.into_iter().collect(),
                calls: calls.clone(),
            };
            (fetcher, calls)
        }
    }

    #[async_trait]
    impl RuleFetcher for FakeFetcher {
        async fn fetch(&self, source: &RuleSource) -> RsadResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(source.name.as_str()) {
                Some(Reply::Body(body)) => Ok(body.to_string()),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(String::new())
                }
                _ => Err(RsadrulesError::SourceUnavailable {
                    name: source.name.clone(),
                    reason: "404".to_string(),
                }),
            }
        }
    }

    /// 按字典序去重排序
    struct LexicalSorter;

    #[async_trait]
    impl RuleSorter for LexicalSorter {
        async fn sort_in_place(&self, path: &Path) -> RsadResult<()> {
            let text = tokio::fs::read_to_string(path).await?;
            let lines: BTreeSet<&str> = text.lines().collect();
            let mut output = lines.into_iter().collect::<Vec<_>>().join("\n");
            output.push('\n');
            tokio::fs::write(path, output).await?;
            Ok(())
        }
    }

    struct FailingSorter;

    #[async_trait]
    impl RuleSorter for FailingSorter {
        async fn sort_in_place(&self, _path: &Path) -> RsadResult<()> {
            Err(RsadrulesError::CollaboratorFailure {
                collaborator: "sorter".to_string(),
                detail: "exit status 1".to_string(),
            })
        }
    }

    struct FailingConverter;

    #[async_trait]
    impl RulesetConverter for FailingConverter {
        async fn convert(&self, _input: &Path, output: &Path) -> RsadResult<()> {
            // 留下半成品，验证其不会被发布
            tokio::fs::write(output, b"partial").await?;
            Err(RsadrulesError::CollaboratorFailure {
                collaborator: "converter".to_string(),
                detail: "exit status 2".to_string(),
            })
        }
    }

    struct Fixture {
        tmp: TempDir,
        config: GlobalConfig,
    }

    impl Fixture {
        fn new(sources: &[&str]) -> Self {
            let tmp = TempDir::new().unwrap();
            let root = tmp.path();
            let custom = root.join("custom.txt");
            std::fs::write(&custom, "||custom.example.com^\r\n@@||allow.example.com^\n").unwrap();

            let config = ConfigManager::custom()
                .sources(
                    sources
                        .iter()
                        .map(|name| SourceEntry::new(name, &format!("https://lists.example.net/{}.txt", name)))
                        .collect(),
                )
                .custom_rules_path(custom)
                .rules_dir(root.join("rules"))
                .work_dir(root.join("work"))
                .gh_proxy_url(String::new())
                .build();
            Self { tmp, config }
        }

        fn seed_previous_artifacts(&self) {
            std::fs::create_dir_all(&self.config.rules_dir).unwrap();
            std::fs::write(self.config.merged_output_path(), "previous text").unwrap();
            std::fs::write(self.config.ruleset_output_path(), [9u8, 9, 9]).unwrap();
        }

        fn assert_previous_artifacts_intact(&self) {
            assert_eq!(std::fs::read(self.config.merged_output_path()).unwrap(), b"previous text");
            assert_eq!(std::fs::read(self.config.ruleset_output_path()).unwrap(), vec![9u8, 9, 9]);
        }

        fn assert_work_dir_clean(&self) {
            let work = self.tmp.path().join("work");
            assert!(!work.exists() || std::fs::read_dir(&work).unwrap().next().is_none());
        }
    }

    #[tokio::test]
    async fn test_full_run_publishes_both_artifacts() {
        let fixture = Fixture::new(&["a", "b"]);
        fixture.seed_previous_artifacts();
        let (fetcher, _) = FakeFetcher::new(vec![
            ("a", Reply::Body("||ads.example.com^\r\n||*.tracker.net^\nplaintext comment")),
            ("b", Reply::Body("||ads.example.com^\n@@||good.example.com^\n||beacon.io^\n")),
        ]);

        let pipeline = Pipeline::with_collaborators(
            fixture.config.clone(),
            Box::new(fetcher),
            Box::new(LexicalSorter),
            Box::new(MsgpackConverter),
        );
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.fetched, vec!["a", "b"]);
        assert!(report.failed.is_empty());
        assert_eq!(report.aggregate_lines, 8);
        assert_eq!(report.carriage_returns_removed, 2);
        assert_eq!(report.sorted_lines, 7);
        assert_eq!(report.extract.kept, 3);

        let merged = std::fs::read_to_string(fixture.config.merged_output_path()).unwrap();
        assert!(!merged.contains('\r'));
        assert_eq!(merged.matches("||ads.example.com^").count(), 1);

        let ruleset = CompiledRuleset::load(&fixture.config.ruleset_output_path()).await.unwrap();
        assert_eq!(
            ruleset.entries,
            vec!["+.ads.example.com", "+.beacon.io", "+.custom.example.com"]
        );
        assert_eq!(report.published.len(), 2);
        fixture.assert_work_dir_clean();
    }

    #[tokio::test]
    async fn test_missing_custom_rules_aborts_before_publish() {
        let fixture = Fixture::new(&["a"]);
        fixture.seed_previous_artifacts();
        std::fs::remove_file(&fixture.config.custom_rules_path).unwrap();
        let (fetcher, calls) = FakeFetcher::new(vec![("a", Reply::Body("||a.com^\n"))]);

        let pipeline = Pipeline::with_collaborators(
            fixture.config.clone(),
            Box::new(fetcher),
            Box::new(LexicalSorter),
            Box::new(MsgpackConverter),
        );
        let err = pipeline.run().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Merge));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        fixture.assert_previous_artifacts_intact();
        fixture.assert_work_dir_clean();
    }

    #[tokio::test]
    async fn test_timed_out_source_is_skipped() {
        let fixture = Fixture::new(&["a", "slow", "c"]);
        let (fetcher, _) = FakeFetcher::new(vec![
            ("a", Reply::Body("||a.com^\n")),
            ("slow", Reply::Hang),
            ("c", Reply::Body("||c.com^\n")),
        ]);

        let pipeline = Pipeline::with_collaborators(
            fixture.config.clone(),
            Box::new(fetcher),
            Box::new(LexicalSorter),
            Box::new(MsgpackConverter),
        )
        .with_source_deadline(Duration::from_millis(100));
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.fetched, vec!["a", "c"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].source.name, "slow");

        let ruleset = CompiledRuleset::load(&fixture.config.ruleset_output_path()).await.unwrap();
        assert_eq!(ruleset.entries, vec!["+.a.com", "+.c.com", "+.custom.example.com"]);
    }

    #[tokio::test]
    async fn test_all_sources_failed_aborts() {
        let fixture = Fixture::new(&["a", "b"]);
        fixture.seed_previous_artifacts();
        let (fetcher, _) = FakeFetcher::new(vec![("a", Reply::NotFound)]);

        let pipeline = Pipeline::with_collaborators(
            fixture.config.clone(),
            Box::new(fetcher),
            Box::new(LexicalSorter),
            Box::new(MsgpackConverter),
        );
        let err = pipeline.run().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Fetch));
        fixture.assert_previous_artifacts_intact();
    }

    #[tokio::test]
    async fn test_collaborator_failures_keep_previous_artifacts() {
        let fixture = Fixture::new(&["a"]);
        fixture.seed_previous_artifacts();
        let (fetcher, _) = FakeFetcher::new(vec![("a", Reply::Body("||a.com^\n"))]);
        let pipeline = Pipeline::with_collaborators(
            fixture.config.clone(),
            Box::new(fetcher),
            Box::new(FailingSorter),
            Box::new(MsgpackConverter),
        );
        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Sort));
        fixture.assert_previous_artifacts_intact();
        fixture.assert_work_dir_clean();

        let (fetcher, _) = FakeFetcher::new(vec![("a", Reply::Body("||a.com^\n"))]);
        let pipeline = Pipeline::with_collaborators(
            fixture.config.clone(),
            Box::new(fetcher),
            Box::new(LexicalSorter),
            Box::new(FailingConverter),
        );
        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Convert));
        fixture.assert_previous_artifacts_intact();
        fixture.assert_work_dir_clean();
    }

    #[tokio::test]
    async fn test_stale_ruleset_is_not_published_when_converter_writes_nothing() {
        let fixture = Fixture::new(&["a"]);
        fixture.seed_previous_artifacts();
        let work = fixture.tmp.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join(RULESET_STAGING), b"stale").unwrap();

        let (fetcher, _) = FakeFetcher::new(vec![("a", Reply::Body("||a.com^\n"))]);
        let pipeline = Pipeline::with_collaborators(
            fixture.config.clone(),
            Box::new(fetcher),
            Box::new(LexicalSorter),
            Box::new(CommandConverter::new("true", vec![])),
        );
        let err = pipeline.run().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Convert));
        fixture.assert_previous_artifacts_intact();
        fixture.assert_work_dir_clean();
    }

    #[tokio::test]
    async fn test_unreadable_custom_rules_path_is_io_error() {
        let fixture = Fixture::new(&["a"]);
        fixture.seed_previous_artifacts();
        // 父路径是普通文件，探测时返回 NotADirectory 而不是“不存在”
        let mut config = fixture.config.clone();
        config.custom_rules_path = fixture.config.custom_rules_path.join("custom.txt");
        let (fetcher, calls) = FakeFetcher::new(vec![("a", Reply::Body("||a.com^\n"))]);

        let pipeline = Pipeline::with_collaborators(
            config,
            Box::new(fetcher),
            Box::new(LexicalSorter),
            Box::new(MsgpackConverter),
        );
        let err = pipeline.run().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Merge));
        match err {
            RsadrulesError::StageFailed { source, .. } => {
                assert!(matches!(*source, RsadrulesError::IoError(_)), "{:?}", source)
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        fixture.assert_previous_artifacts_intact();
    }
}
