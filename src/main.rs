use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use rsadrules::{
    BuiltinSorter, ConfigManager, CustomConfigBuilder, DomainExtractor, GlobalConfig, Pipeline,
    RuleSorter, SourceEntry,
};

#[derive(Debug, Parser)]
#[command(name = "rsadrules", version, about = "广告过滤规则聚合与规则集编译工具")]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 拉取、合并、去重排序、提取域名并发布规则集
    Build {
        /// JSON 配置文件
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// 发布目录
        #[arg(long)]
        rules_dir: Option<PathBuf>,
        /// 本地自定义规则文件
        #[arg(long)]
        custom: Option<PathBuf>,
        /// 远程规则源URL（可重复，指定后替换配置中的规则源）
        #[arg(long = "source")]
        sources: Vec<String>,
        /// 单个规则源超时（秒）
        #[arg(long)]
        timeout: Option<u64>,
        /// 中间文件目录
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
    /// 使用内置排序器原地优化规则文件
    Sort {
        file: PathBuf,
        /// 不写入文件头部信息
        #[arg(long)]
        no_header: bool,
        /// 保留国家代码后缀域名
        #[arg(long)]
        keep_country_suffixes: bool,
    },
    /// 从规则文件提取域名并输出到标准输出
    Extract {
        file: PathBuf,
        /// 输出带 `+.` 前缀的域名集合
        #[arg(long)]
        domain_set: bool,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// 命令行规则源：名称取自主机名，重名时附加序号
fn cli_sources(urls: &[String]) -> Result<Vec<SourceEntry>> {
    urls.iter()
        .enumerate()
        .map(|(idx, raw)| {
            let url = Url::parse(raw).with_context(|| format!("无效的规则源URL：{}", raw))?;
            let host = url.host_str().unwrap_or("source");
            Ok(SourceEntry::new(&format!("{}-{}", host, idx + 1), raw))
        })
        .collect()
}

fn build_config(
    config: Option<PathBuf>,
    rules_dir: Option<PathBuf>,
    custom: Option<PathBuf>,
    sources: Vec<String>,
    timeout: Option<u64>,
    work_dir: Option<PathBuf>,
) -> Result<GlobalConfig> {
    let base = match config {
        Some(path) => GlobalConfig::load_from_file(&path)
            .with_context(|| format!("加载配置文件 {} 失败", path.display()))?,
        None => ConfigManager::get_default(),
    };

    let mut builder = CustomConfigBuilder::from_config(base);
    if let Some(dir) = rules_dir {
        builder = builder.rules_dir(dir);
    }
    if let Some(path) = custom {
        builder = builder.custom_rules_path(path);
    }
    if !sources.is_empty() {
        builder = builder.sources(cli_sources(&sources)?);
    }
    if let Some(secs) = timeout {
        builder = builder.http_timeout(secs);
    }
    if let Some(dir) = work_dir {
        builder = builder.work_dir(dir);
    }

    let config = builder.build();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { config, rules_dir, custom, sources, timeout, work_dir } => {
            let config = build_config(config, rules_dir, custom, sources, timeout, work_dir)?;
            setup_logging(cli.verbose || config.verbose);
            info!("Starting rsadrules...");

            let pipeline = Pipeline::new(config)?;
            let report = pipeline.run().await?;
            for path in &report.published {
                info!("产物：{}", path.display());
            }
            if !report.failed.is_empty() {
                info!("本次运行跳过 {} 个规则源", report.failed.len());
            }
        }
        Commands::Sort { file, no_header, keep_country_suffixes } => {
            setup_logging(cli.verbose);
            BuiltinSorter::new(!no_header, !keep_country_suffixes)
                .sort_in_place(&file)
                .await
                .with_context(|| format!("优化 {} 失败", file.display()))?;
        }
        Commands::Extract { file, domain_set } => {
            setup_logging(cli.verbose);
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("读取 {} 失败", file.display()))?;
            let lists = DomainExtractor::extract(&text);
            let output = if domain_set { lists.domain_set_text() } else { lists.domains_text() };
            print!("{}", output);
            info!("提取域名 {} 个，跳过 {} 行", lists.stats.kept, lists.stats.skipped());
        }
    }

    Ok(())
}
